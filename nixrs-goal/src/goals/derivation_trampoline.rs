use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::try_join_all;
use nixrs::derivation::Derivation;
use nixrs::derived_path::OutputSpec;
use nixrs::derived_path::SingleDerivedPath;
use nixrs::store::Store;
use nixrs::store_path::StorePath;
use tracing::instrument;

use super::derivation::derivation_goal;
use super::drv_output_substitution::QueryRealisation;
use crate::error::Error;
use crate::exit_code::{ExitCode, ExitTally};
use crate::key;
use crate::scheduler::Scheduler;

#[derive(Debug, Clone)]
pub struct TrampolineOutcome {
    pub exit_code: ExitCode,
    pub built_outputs: BTreeMap<String, StorePath>,
}

/// Goal #1: `DerivationTrampolineGoal`, the entry point a caller reaches
/// for. Fans out one [`derivation_goal`] per wanted output and folds their
/// exit codes into a single summary, the way `Goal::await()` does for a
/// goal's direct dependents.
///
/// Takes an already-resolved `(StorePath, Derivation)` pair rather than a
/// [`SingleDerivedPath`] that might itself be `Built { .. }` on a dynamic
/// derivation's output: resolving *that* needs a store primitive to read an
/// arbitrary file out of an unrealized output path, which nothing in this
/// store implements yet. Callers holding a `Built` request are expected to
/// have already driven it down to a concrete `.drv` path before calling in.
#[instrument(skip(scheduler, drv, substituters), fields(drv_path = %drv_path, wanted_outputs = %wanted_outputs))]
pub async fn derivation_trampoline_goal<S, Sub>(
    scheduler: Arc<Scheduler<S>>,
    drv_path: StorePath,
    drv: Derivation,
    wanted_outputs: OutputSpec,
    substituters: Vec<Sub>,
) -> Result<TrampolineOutcome, Error>
where
    S: Store + Send + 'static,
    Sub: QueryRealisation + Clone + Send + 'static,
{
    let req = SingleDerivedPath::Opaque(drv_path.clone());
    let goal_key = key::derivation_trampoline(scheduler.store_dir(), &req, &wanted_outputs);
    let scheduler2 = scheduler.clone();
    scheduler
        .trampoline_goals
        .get_or_init(goal_key, move || {
            run(scheduler2, drv_path, drv, wanted_outputs, substituters)
        })
        .await
}

async fn run<S, Sub>(
    scheduler: Arc<Scheduler<S>>,
    drv_path: StorePath,
    drv: Derivation,
    wanted_outputs: OutputSpec,
    substituters: Vec<Sub>,
) -> Result<TrampolineOutcome, Error>
where
    S: Store + Send + 'static,
    Sub: QueryRealisation + Clone + Send + 'static,
{
    let names: Vec<String> = match &wanted_outputs {
        OutputSpec::All => drv.outputs.keys().cloned().collect(),
        OutputSpec::Named(names) => names.iter().map(|n| n.as_ref().to_string()).collect(),
    };

    let futures = names.into_iter().map(|name| {
        let scheduler = scheduler.clone();
        let drv_path = drv_path.clone();
        let drv = drv.clone();
        let substituters = substituters.clone();
        async move {
            let output_name = name.parse().map_err(|e: nixrs::store_path::StorePathNameError| {
                Error::Custom(e.to_string())
            })?;
            let outcome = derivation_goal(scheduler, drv_path, drv, output_name, substituters).await?;
            Ok::<_, Error>((name, outcome))
        }
    });

    let results = try_join_all(futures).await?;

    let mut tally = ExitTally::default();
    let mut built_outputs = BTreeMap::new();
    for (name, outcome) in results {
        tally.record(outcome.exit_code);
        if let Some(path) = outcome.output_path {
            built_outputs.insert(name, path);
        }
    }

    Ok(TrampolineOutcome {
        exit_code: tally.overall(),
        built_outputs,
    })
}
