use std::sync::Arc;

use thiserror::Error;

/// Errors produced by the scheduler and its goals.
///
/// Store errors are wrapped in an [`Arc`] rather than surfaced directly
/// because goal results are cached behind a [`futures::future::Shared`]
/// future, whose `Output` must be `Clone`; `nixrs::store::Error` itself
/// is not (it carries a plain `std::io::Error` in places).
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(transparent)]
    Store(Arc<nixrs::store::Error>),

    #[error("no substituters could provide '{0}'")]
    NoSubstituters(String),

    #[error("cycle detected while resolving '{0}'")]
    Cycle(String),

    #[error("{0}")]
    Custom(String),
}

impl From<nixrs::store::Error> for Error {
    fn from(err: nixrs::store::Error) -> Self {
        Error::Store(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
