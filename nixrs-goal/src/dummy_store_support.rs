use async_trait::async_trait;
use nixrs::realisation::{DrvOutput, Realisation};
use nixrs::store::{DummyStore, Error};

use crate::goals::QueryRealisation;

/// `DummyStore`'s build trace is just an in-memory map, so looking up a
/// realisation by id never actually needs `&mut self` or I/O; this just
/// adapts its existing accessor to the trait `DrvOutputSubstitutionGoal`
/// drives substituters through.
#[async_trait]
impl QueryRealisation for DummyStore {
    async fn query_realisation(&mut self, id: &DrvOutput) -> Result<Option<Realisation>, Error> {
        Ok(DummyStore::query_realisation(self, id))
    }
}
