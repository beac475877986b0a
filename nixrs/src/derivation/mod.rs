mod aterm;
mod basic_derivation;
mod derivation;
mod derivation_output;
mod error;

pub use basic_derivation::BasicDerivation;
pub use derivation::{Derivation, HashKind, HashModulo};
#[cfg(feature = "daemon")]
pub(crate) use derivation_output::output_path_name;
pub use derivation_output::{DerivationOutput, DerivationOutputs};
pub use error::{DerivationOutputsError, ReadDerivationError, WriteDerivationError};
