use thiserror::Error;

use crate::hash;
use crate::store_path::{ParseStorePathError, StorePathNameError};

/// Errors produced parsing a derivation from its ATerm or JSON on-disk
/// representation.
#[derive(Error, Debug)]
pub enum ReadDerivationError {
    #[error("{0}")]
    StorePath(
        #[from]
        #[source]
        ParseStorePathError,
    ),
    #[error("{0}")]
    OutputName(
        #[from]
        #[source]
        StorePathNameError,
    ),
    #[error("{0}")]
    Hash(
        #[from]
        #[source]
        hash::fmt::ParseHashError,
    ),
    #[error("{0}")]
    Json(
        #[from]
        #[source]
        serde_json::Error,
    ),
    #[error("unexpected end of input while parsing derivation")]
    UnexpectedEof,
    #[error("expected {expected:?} at offset {offset}")]
    Expected { expected: &'static str, offset: usize },
    #[error("unknown derivation format version {0:?}")]
    UnknownVersion(String),
    #[error("missing experimental feature {0:?}")]
    MissingExperimentalFeature(&'static str),
}

/// Errors computing or serializing a derivation's canonical text encoding
/// (the input to `hashDerivationModulo` and the ATerm file format).
#[derive(Error, Debug)]
pub enum WriteDerivationError {
    #[error("{0}")]
    StorePath(
        #[from]
        #[source]
        ParseStorePathError,
    ),
    #[error("{0}")]
    Json(
        #[from]
        #[source]
        serde_json::Error,
    ),
    #[error("missing hash-modulo for input derivation {0:?}")]
    MissingInputHash(String),
}

/// Errors computing derivation output paths (`fillInOutputPaths`,
/// `tryResolve`).
#[derive(Error, Debug)]
pub enum DerivationOutputsError {
    #[error("{0}")]
    StorePath(
        #[from]
        #[source]
        ParseStorePathError,
    ),
    #[error("derivation output {name:?} is tampered: recomputed path {expected} does not match stored path {actual}")]
    Tampered {
        name: String,
        expected: String,
        actual: String,
    },
    #[error("missing hash-modulo for output {0:?}")]
    MissingHash(String),
}
