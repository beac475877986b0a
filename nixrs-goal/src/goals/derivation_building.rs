use std::sync::Arc;

use nixrs::derivation::BasicDerivation;
use nixrs::realisation::DrvOutputs;
use nixrs::store::{BuildResult, RepairFlag, Store};
use nixrs::store_path::{StorePath, StorePathSet};
use tracing::{info, instrument, warn};

use super::path_substitution::path_substitution_goal;
use crate::error::Error;
use crate::exit_code::ExitCode;
use crate::job::JobCategory;
use crate::key;
use crate::scheduler::Scheduler;

#[derive(Debug, Clone)]
pub struct BuildingOutcome {
    pub exit_code: ExitCode,
    pub result: BuildResult,
}

/// Goal #7: `DerivationBuildingGoal`, the "real builder". Ensures the
/// derivation's declared inputs are present (substituting what's
/// missing), takes a build-job slot, and hands the derivation to the
/// connected store's `build_derivation`. Sandbox setup and process
/// supervision are the connected [`Store`] implementation's concern
/// (the legacy-worker client forwards to a real `nix-store --serve`
/// child, for instance) — this goal is the scheduling layer around that
/// call, not a from-scratch sandboxing engine.
#[instrument(skip(scheduler, drv, substituters), fields(drv_path = %drv_path))]
pub async fn derivation_building_goal<S, Sub>(
    scheduler: Arc<Scheduler<S>>,
    drv_path: StorePath,
    drv: BasicDerivation,
    substituters: Vec<Sub>,
) -> Result<BuildingOutcome, Error>
where
    S: Store + Send + 'static,
    Sub: Store + Clone + Send + 'static,
{
    let goal_key = key::derivation_building(scheduler.store_dir(), &drv_path);
    let scheduler2 = scheduler.clone();
    scheduler
        .building_goals
        .get_or_init(goal_key, move || run(scheduler2, drv_path, drv, substituters))
        .await
}

async fn run<S, Sub>(
    scheduler: Arc<Scheduler<S>>,
    drv_path: StorePath,
    drv: BasicDerivation,
    substituters: Vec<Sub>,
) -> Result<BuildingOutcome, Error>
where
    S: Store + Send + 'static,
    Sub: Store + Clone + Send + 'static,
{
    let mut store = scheduler.store();

    let mut wanted: StorePathSet = drv.input_srcs.clone();
    let missing: StorePathSet = {
        let valid = store
            .query_valid_paths(&wanted, nixrs::store::SubstituteFlag::NoSubstitute)
            .await?;
        wanted.retain(|p| !valid.contains(p));
        wanted
    };

    for path in &missing {
        let outcome =
            path_substitution_goal(scheduler.clone(), path.clone(), substituters.clone(), RepairFlag::NoRepair)
                .await?;
        if !outcome.exit_code.is_success() {
            warn!("missing build input '{}' could not be substituted", path);
            return Ok(BuildingOutcome {
                exit_code: ExitCode::IncompleteClosure,
                result: BuildResult::new(
                    nixrs::store::BuildStatus::DependencyFailed,
                    format!("input '{path}' is neither present nor substitutable"),
                ),
            });
        }
    }

    let _permit = scheduler.acquire_slot(JobCategory::Build).await;
    info!("building '{}'", drv_path);

    let settings = scheduler.settings().clone();
    let log = tokio::io::sink();
    let result = store
        .build_derivation(&drv_path, &drv, &settings, log)
        .await?;

    let exit_code = if result.success() {
        ExitCode::Success
    } else {
        ExitCode::Failed
    };
    Ok(BuildingOutcome { exit_code, result })
}

pub fn realised_outputs(result: &BuildResult) -> &DrvOutputs {
    &result.built_outputs
}
