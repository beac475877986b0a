use std::sync::Arc;

use thiserror::Error;

/// Errors from the accessor layer and the fetcher registry.
///
/// `Io`/`Store` wrap their causes in an [`Arc`] for the same reason
/// `nixrs_goal::Error` does: results flowing through a cached future need
/// to stay `Clone`, and `std::io::Error`/`nixrs::store::Error` aren't.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("{0}")]
    Io(#[source] Arc<std::io::Error>),

    #[error(transparent)]
    Store(Arc<nixrs::store::Error>),

    #[error("path '{0}' does not exist")]
    NotFound(String),

    #[error("'{0}' is not a regular file")]
    NotAFile(String),

    #[error("'{0}' is not a directory")]
    NotADirectory(String),

    #[error("'{0}' is not a symlink")]
    NotASymlink(String),

    #[error("access to '{0}' is forbidden by this accessor's restriction")]
    RestrictedPath(String),

    #[error("unsupported input URL scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("invalid input attribute '{0}': {1}")]
    InvalidAttr(String, String),

    #[error("input '{0}' is not locked and lockless fetching is disallowed here")]
    NotLocked(String),

    #[error("fetching '{0}' requires the unguarded experimental feature '{1}'")]
    MissingExperimentalFeature(String, String),

    #[error("network request for '{0}' failed: {1}")]
    Network(String, String),

    #[error("{0}")]
    Custom(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<nixrs::store::Error> for Error {
    fn from(err: nixrs::store::Error) -> Self {
        Error::Store(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
