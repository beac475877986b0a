use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};

use super::{DirEntries, InputAccessor, Stat};

/// A predicate deciding whether a path under a [`FilteringAccessor`] may be
/// read at all, independent of the usual `.gitignore`-style include/exclude
/// rules a caller layers on top via the closure it supplies.
pub trait PathFilter: Send + Sync {
    fn is_allowed(&self, path: &str) -> bool;
}

impl<F> PathFilter for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_allowed(&self, path: &str) -> bool {
        self(path)
    }
}

/// Wraps another accessor and rejects every access outside a predicate —
/// the mechanism behind `builtins.path { filter = ...; }` and flakes'
/// `fileset` API, neither of which needs its own storage backend, just a
/// gate in front of one that already exists.
pub struct FilteringAccessor {
    inner: Arc<dyn InputAccessor>,
    filter: Arc<dyn PathFilter>,
}

impl FilteringAccessor {
    pub fn new(inner: Arc<dyn InputAccessor>, filter: Arc<dyn PathFilter>) -> Self {
        FilteringAccessor { inner, filter }
    }

    fn check(&self, path: &str) -> Result<()> {
        if self.filter.is_allowed(path) {
            Ok(())
        } else {
            Err(Error::RestrictedPath(path.to_string()))
        }
    }
}

#[async_trait]
impl InputAccessor for FilteringAccessor {
    fn display_name(&self) -> String {
        self.inner.display_name()
    }

    async fn maybe_lstat(&self, path: &str) -> Result<Option<Stat>> {
        self.check(path)?;
        self.inner.maybe_lstat(path).await
    }

    async fn read_file(&self, path: &str) -> Result<Bytes> {
        self.check(path)?;
        self.inner.read_file(path).await
    }

    async fn read_directory(&self, path: &str) -> Result<DirEntries> {
        self.check(path)?;
        let entries = self.inner.read_directory(path).await?;
        Ok(entries
            .into_iter()
            .filter(|(name, _)| {
                let child = if path.is_empty() {
                    name.clone()
                } else {
                    format!("{path}/{name}")
                };
                self.filter.is_allowed(&child)
            })
            .collect())
    }

    async fn read_link(&self, path: &str) -> Result<String> {
        self.check(path)?;
        self.inner.read_link(path).await
    }
}
