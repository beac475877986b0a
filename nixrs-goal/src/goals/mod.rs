//! The seven goal kinds the scheduler drives, one module each, the way the
//! worker's `build/*.cc` files each own one `Goal` subclass.

pub mod build_trace_trampoline;
pub mod derivation;
pub mod derivation_building;
pub mod derivation_resolution;
pub mod derivation_trampoline;
pub mod drv_output_substitution;
pub mod path_substitution;

pub use build_trace_trampoline::{build_trace_trampoline_goal, BuildTraceOutcome};
pub use derivation::{derivation_goal, DerivationOutcome};
pub use derivation_building::{derivation_building_goal, realised_outputs, BuildingOutcome};
pub use derivation_resolution::{derivation_resolution_goal, ResolutionOutcome};
pub use derivation_trampoline::{derivation_trampoline_goal, TrampolineOutcome};
pub use drv_output_substitution::{drv_output_substitution_goal, QueryRealisation};
pub use path_substitution::{path_substitution_goal, SubstitutionOutcome};
