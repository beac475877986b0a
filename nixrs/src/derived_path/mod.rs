mod map;
mod output_spec;
mod path;

pub use map::{ChildNode, DerivedPathMap};
pub use output_spec::{ExtendedOutputsSpec, OutputName, OutputSpec, ParseExtendedOutputsSpecError};
pub use path::{DerivedPath, LegacyDerivedPath, SingleDerivedPath};
