use std::sync::Arc;

use nixrs::realisation::{DrvOutput, Realisation};
use nixrs::store::{RepairFlag, Store};
use tracing::instrument;

use super::drv_output_substitution::{drv_output_substitution_goal, QueryRealisation};
use crate::error::Error;
use crate::exit_code::ExitCode;
use crate::key;
use crate::scheduler::Scheduler;

#[derive(Debug, Clone)]
pub struct BuildTraceOutcome {
    pub exit_code: ExitCode,
    pub realisation: Option<Realisation>,
}

/// Goal #4: `BuildTraceTrampolineGoal`. Looks an output up in the
/// in-memory build trace first; if it's not there yet, tries to obtain it
/// from a substituter. Does not fall through to an actual build — that is
/// `DerivationGoal`/`DerivationBuildingGoal`'s job once a real `.drv` and
/// input closure are in hand, which this goal, working only from a
/// `DrvOutput` id, does not have.
///
/// The original worker recurses through `BuildTraceTrampolineGoal` again
/// after a `DerivationResolutionGoal` rewrites a dynamic derivation's
/// inputs, to pick up realisations the rewrite exposes. Skipped here:
/// [`super::derivation_resolution::derivation_resolution_goal`] only ever
/// folds already-built `inputDrvs` into `inputSrcs`, which exposes no new
/// output whose realisation this goal would need to go pick up.
#[instrument(skip(scheduler, substituters), fields(id = %id))]
pub async fn build_trace_trampoline_goal<S, Sub>(
    scheduler: Arc<Scheduler<S>>,
    id: DrvOutput,
    substituters: Vec<Sub>,
    repair: RepairFlag,
) -> Result<BuildTraceOutcome, Error>
where
    S: Store + Send + 'static,
    Sub: QueryRealisation + Clone + Send + 'static,
{
    let goal_key = key::build_trace_trampoline_for_output(&id);
    let scheduler2 = scheduler.clone();
    scheduler
        .build_trace_goals
        .get_or_init(goal_key, move || run(scheduler2, id, substituters, repair))
        .await
}

async fn run<S, Sub>(
    scheduler: Arc<Scheduler<S>>,
    id: DrvOutput,
    substituters: Vec<Sub>,
    repair: RepairFlag,
) -> Result<BuildTraceOutcome, Error>
where
    S: Store + Send + 'static,
    Sub: QueryRealisation + Clone + Send + 'static,
{
    if let Some(realisation) = scheduler.lookup_realisation(&id) {
        return Ok(BuildTraceOutcome {
            exit_code: ExitCode::Success,
            realisation: Some(realisation),
        });
    }

    let outcome = drv_output_substitution_goal(scheduler.clone(), id.clone(), substituters, repair).await?;
    if !outcome.exit_code.is_success() {
        return Ok(BuildTraceOutcome {
            exit_code: outcome.exit_code,
            realisation: None,
        });
    }

    Ok(BuildTraceOutcome {
        exit_code: ExitCode::Success,
        realisation: scheduler.lookup_realisation(&id),
    })
}
