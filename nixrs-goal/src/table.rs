use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::error::Error;

/// A per-goal-type interning map, the Rust counterpart of the worker's
/// `derivationGoals`/`substitutionGoals`/... fields and its templated
/// `initGoalIfNeeded<G>`.
///
/// Where the C++ worker stores a `weak_ptr<Goal>` and reconstructs the
/// goal if its last strong reference was dropped, this keeps a
/// [`Shared`] future alive for as long as any caller is awaiting (or has
/// awaited) it: the first caller to ask for a key drives the work, every
/// later caller for the same key gets the same in-flight or completed
/// result instead of duplicating it.
pub struct GoalTable<T> {
    inner: Mutex<HashMap<String, Shared<BoxFuture<'static, Result<T, Error>>>>>,
}

impl<T> Default for GoalTable<T> {
    fn default() -> Self {
        GoalTable {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> GoalTable<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached result for `key`, or runs `init` to produce one.
    pub async fn get_or_init<F, Fut>(&self, key: String, init: F) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
    {
        let shared = {
            let mut goals = self.inner.lock().expect("goal table poisoned");
            goals
                .entry(key)
                .or_insert_with(|| init().boxed().shared())
                .clone()
        };
        shared.await
    }

    /// Number of goals ever interned under this table, live or finished.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("goal table poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
