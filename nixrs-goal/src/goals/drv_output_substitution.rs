use std::sync::Arc;

use async_trait::async_trait;
use nixrs::realisation::{DrvOutput, Realisation};
use nixrs::store::{RepairFlag, Store};
use tracing::{debug, info, instrument};

use super::path_substitution::path_substitution_goal;
use crate::error::Error;
use crate::exit_code::ExitCode;
use crate::key;
use crate::scheduler::Scheduler;

use super::SubstitutionOutcome;

/// Extends [`Store`] with the one extra worker-protocol operation
/// `DrvOutputSubstitutionGoal` needs that the base trait doesn't model:
/// looking up a content-addressed realisation by its `DrvOutput` id. The
/// same pattern `LegacyStore: Store` uses for the legacy-worker-only
/// operations it adds.
#[async_trait]
pub trait QueryRealisation: Store {
    async fn query_realisation(
        &mut self,
        id: &DrvOutput,
    ) -> Result<Option<Realisation>, nixrs::store::Error>;
}

/// Goal #6: `DrvOutputSubstitutionGoal`. Like [`path_substitution_goal`]
/// but at the CA-realisation level: finds a substituter with a
/// `Realisation` for `id`, then substitutes the realisation's output
/// path via a nested `PathSubstitutionGoal`.
#[instrument(skip(scheduler, substituters), fields(id = %id))]
pub async fn drv_output_substitution_goal<S, Sub>(
    scheduler: Arc<Scheduler<S>>,
    id: DrvOutput,
    substituters: Vec<Sub>,
    repair: RepairFlag,
) -> Result<SubstitutionOutcome, Error>
where
    S: Store + Send + 'static,
    Sub: QueryRealisation + Clone + Send + 'static,
{
    let goal_key = key::drv_output_substitution(&id);
    let scheduler2 = scheduler.clone();
    scheduler
        .drv_output_substitution_goals
        .get_or_init(goal_key, move || run(scheduler2, id, substituters, repair))
        .await
}

async fn run<S, Sub>(
    scheduler: Arc<Scheduler<S>>,
    id: DrvOutput,
    mut substituters: Vec<Sub>,
    repair: RepairFlag,
) -> Result<SubstitutionOutcome, Error>
where
    S: Store + Send + 'static,
    Sub: QueryRealisation + Clone + Send + 'static,
{
    for sub in substituters.iter_mut() {
        let realisation = match sub.query_realisation(&id).await? {
            Some(r) => r,
            None => continue,
        };
        debug!("found realisation for '{}' at '{}'", id, realisation.out_path);

        let outcome = path_substitution_goal(
            scheduler.clone(),
            realisation.out_path.clone(),
            vec![sub.clone()],
            repair,
        )
        .await?;
        if outcome.exit_code.is_success() {
            info!("substituted derivation output '{}'", id);
            scheduler.record_realisation(id.clone(), realisation);
            return Ok(SubstitutionOutcome {
                exit_code: ExitCode::Success,
            });
        }
    }

    Ok(SubstitutionOutcome {
        exit_code: ExitCode::NoSubstituters,
    })
}
