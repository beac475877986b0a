//! A cooperative, single-process goal scheduler for building and
//! substituting store paths.
//!
//! Where the C++ worker drives a DAG of reference-counted `Goal` objects
//! through a hand-rolled coroutine trampoline, here each goal is just an
//! `async fn`: a sub-goal dependency is a nested `.await`, and goal
//! deduplication (the `weak_ptr` maps keyed by derivation path) is handled
//! by [`table::GoalTable`] memoizing a [`futures::future::Shared`] future
//! per goal key instead.

mod dummy_store_support;
mod error;
mod exit_code;
pub mod goals;
mod job;
mod key;
mod scheduler;
mod table;

pub use error::{Error, Result};
pub use exit_code::{ExitCode, ExitTally};
pub use goals::{
    build_trace_trampoline_goal, derivation_building_goal, derivation_goal,
    derivation_resolution_goal, derivation_trampoline_goal, drv_output_substitution_goal,
    path_substitution_goal, BuildTraceOutcome, BuildingOutcome, DerivationOutcome,
    QueryRealisation, ResolutionOutcome, SubstitutionOutcome, TrampolineOutcome,
};
pub use job::JobCategory;
pub use scheduler::Scheduler;
