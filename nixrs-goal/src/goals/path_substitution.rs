use std::sync::Arc;

use nixrs::store::{CheckSignaturesFlag, RepairFlag, Store};
use nixrs::store_path::StorePath;
use tracing::{debug, info, instrument, warn};

use crate::error::Error;
use crate::exit_code::ExitCode;
use crate::job::JobCategory;
use crate::key;
use crate::scheduler::Scheduler;

#[derive(Debug, Clone)]
pub struct SubstitutionOutcome {
    pub exit_code: ExitCode,
}

/// Goal #5: `PathSubstitutionGoal`. Tries each substituter in the given
/// (already priority-sorted) order; the first one whose `queryPathInfo`
/// resolves and whose claim is trustworthy (content-addressed, or
/// otherwise just accepted on the caller's say-so — signature checking
/// against a trusted-key list lives in [`CheckSignaturesFlag`] at the
/// `add_to_store` layer) wins. Exhausting the list yields
/// `NoSubstituters`.
#[instrument(skip(scheduler, substituters), fields(path = %path))]
pub async fn path_substitution_goal<S, Sub>(
    scheduler: Arc<Scheduler<S>>,
    path: StorePath,
    substituters: Vec<Sub>,
    repair: RepairFlag,
) -> Result<SubstitutionOutcome, Error>
where
    S: Store + Send + 'static,
    Sub: Store + Send + Clone + 'static,
{
    let goal_key = key::path_substitution(scheduler.store_dir(), &path);
    let scheduler2 = scheduler.clone();
    scheduler
        .path_substitution_goals
        .get_or_init(goal_key, move || {
            run(scheduler2, path, substituters, repair)
        })
        .await
}

async fn run<S, Sub>(
    scheduler: Arc<Scheduler<S>>,
    path: StorePath,
    mut substituters: Vec<Sub>,
    repair: RepairFlag,
) -> Result<SubstitutionOutcome, Error>
where
    S: Store + Send + 'static,
    Sub: Store + Send + Clone + 'static,
{
    let mut store = scheduler.store();
    if store.query_path_info(&path).await?.is_some() {
        return Ok(SubstitutionOutcome {
            exit_code: ExitCode::Success,
        });
    }

    for sub in substituters.iter_mut() {
        let info = match sub.query_path_info(&path).await? {
            Some(info) => info,
            None => continue,
        };
        if info.ca.is_none() && info.sigs.is_empty() {
            warn!(
                "ignoring substituter's unsigned, non-content-addressed claim for '{}'",
                path
            );
            continue;
        }

        let _permit = scheduler.acquire_slot(JobCategory::Substitution).await;
        match nixrs::store::copy_store_path(
            sub,
            &mut store,
            &path,
            repair,
            CheckSignaturesFlag::CheckSigs,
        )
        .await
        {
            Ok(()) => {
                info!("substituted path '{}'", path);
                for reference in info.references.iter() {
                    if reference == &path {
                        continue;
                    }
                    let outcome = Box::pin(path_substitution_goal(
                        scheduler.clone(),
                        reference.clone(),
                        substituters.clone(),
                        repair,
                    ))
                    .await?;
                    if outcome.exit_code != ExitCode::Success {
                        return Ok(outcome);
                    }
                }
                return Ok(SubstitutionOutcome {
                    exit_code: ExitCode::Success,
                });
            }
            Err(err) => {
                debug!("substituter failed for '{}': {}", path, err);
                continue;
            }
        }
    }

    Ok(SubstitutionOutcome {
        exit_code: ExitCode::NoSubstituters,
    })
}
