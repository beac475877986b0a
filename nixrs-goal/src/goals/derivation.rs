use std::collections::BTreeMap;
use std::sync::Arc;

use nixrs::derivation::{BasicDerivation, Derivation};
use nixrs::derived_path::OutputName;
use nixrs::realisation::DrvOutput;
use nixrs::store::{RepairFlag, Store};
use nixrs::store_path::{StoreDir, StorePath};
use nixrs::ByteString;
use tracing::{info, instrument};

use super::build_trace_trampoline::build_trace_trampoline_goal;
use super::derivation_building::derivation_building_goal;
use super::derivation_resolution::derivation_resolution_goal;
use super::drv_output_substitution::QueryRealisation;
use super::path_substitution::path_substitution_goal;
use crate::error::Error;
use crate::exit_code::ExitCode;
use crate::key;
use crate::scheduler::Scheduler;

#[derive(Debug, Clone)]
pub struct DerivationOutcome {
    pub exit_code: ExitCode,
    pub output_path: Option<StorePath>,
}

/// Builds the [`BasicDerivation`] the store-level build call expects out of
/// the graph-level [`Derivation`] the trampoline goal was handed. Input
/// derivations have already been reduced to `input_srcs` by the time a
/// single-output goal runs; only the scalar fields need re-encoding as
/// [`ByteString`].
fn to_basic_derivation(drv_path: StorePath, drv: &Derivation) -> BasicDerivation {
    BasicDerivation {
        drv_path,
        outputs: drv.outputs.clone(),
        input_srcs: drv.input_srcs.clone(),
        platform: ByteString::from(drv.platform.clone()),
        builder: ByteString::from(drv.builder.clone()),
        args: drv.args.iter().cloned().map(ByteString::from).collect(),
        env: drv
            .env
            .iter()
            .map(|(k, v)| (ByteString::from(k.clone()), ByteString::from(v.clone())))
            .collect(),
    }
}

/// Goal #2: `DerivationGoal`, scoped to a single wanted output. Ensures
/// `wanted_output` is either already valid, substitutable, or built, and
/// reports back the resulting store path.
///
/// `drv.outputs` entries that resolve to `None` (a `Deferred` output of an
/// as-yet-unresolved dynamic derivation) are out of scope, since nothing in
/// this store ever produces them; they report [`ExitCode::Failed`].
#[instrument(skip(scheduler, drv, substituters), fields(drv_path = %drv_path, wanted_output = %wanted_output))]
pub async fn derivation_goal<S, Sub>(
    scheduler: Arc<Scheduler<S>>,
    drv_path: StorePath,
    drv: Derivation,
    wanted_output: OutputName,
    substituters: Vec<Sub>,
) -> Result<DerivationOutcome, Error>
where
    S: Store + Send + 'static,
    Sub: QueryRealisation + Clone + Send + 'static,
{
    let goal_key = key::derivation(scheduler.store_dir(), &drv_path, &wanted_output);
    let scheduler2 = scheduler.clone();
    scheduler
        .derivation_goals
        .get_or_init(goal_key, move || {
            run(scheduler2, drv_path, drv, wanted_output, substituters)
        })
        .await
}

async fn run<S, Sub>(
    scheduler: Arc<Scheduler<S>>,
    drv_path: StorePath,
    drv: Derivation,
    wanted_output: OutputName,
    substituters: Vec<Sub>,
) -> Result<DerivationOutcome, Error>
where
    S: Store + Send + 'static,
    Sub: QueryRealisation + Clone + Send + 'static,
{
    let resolution = derivation_resolution_goal(scheduler.clone(), drv_path.clone(), drv.clone()).await?;
    let drv = match resolution.resolved {
        Some((_, resolved)) => resolved,
        None => drv,
    };

    let Some(output) = drv.outputs.get(wanted_output.as_ref()) else {
        return Ok(DerivationOutcome {
            exit_code: ExitCode::Failed,
            output_path: None,
        });
    };

    let store_dir = scheduler.store_dir().clone();
    let output_path = match output
        .path(&store_dir, &drv.name, wanted_output.as_ref())
        .map_err(|e| Error::Custom(e.to_string()))?
    {
        Some(path) => path,
        // A floating output (`CAFloating`) has no statically-known path
        // until something has actually built or substituted it once. The
        // only way to learn it without building is the build trace: look
        // the output up by its derivation hash and let
        // `BuildTraceTrampolineGoal` either answer from the in-memory trace
        // or pull a realisation in over a substituter.
        None => return resolve_via_build_trace(scheduler, &drv, &store_dir, wanted_output, substituters).await,
    };

    let mut store = scheduler.store();
    if store.query_path_info(&output_path).await?.is_some() {
        return Ok(DerivationOutcome {
            exit_code: ExitCode::Success,
            output_path: Some(output_path),
        });
    }

    if !substituters.is_empty() {
        let outcome = path_substitution_goal(
            scheduler.clone(),
            output_path.clone(),
            substituters.clone(),
            RepairFlag::NoRepair,
        )
        .await?;
        if outcome.exit_code.is_success() {
            info!("output '{}' satisfied by substitution", output_path);
            return Ok(DerivationOutcome {
                exit_code: ExitCode::Success,
                output_path: Some(output_path),
            });
        }
    }

    let basic = to_basic_derivation(drv_path, &drv);
    let outcome = derivation_building_goal(scheduler, basic.drv_path.clone(), basic, substituters).await?;
    Ok(DerivationOutcome {
        exit_code: outcome.exit_code,
        output_path: if outcome.exit_code.is_success() {
            Some(output_path)
        } else {
            None
        },
    })
}

/// `DerivationGoal`'s path for an output with no statically-known path
/// (`CAFloating`, or a not-yet-resolved `Deferred`): compute the
/// output's `hashDerivationModulo`-keyed `DrvOutput` id and hand it to
/// [`build_trace_trampoline_goal`], which answers from the in-memory
/// build trace or substitutes a realisation in.
///
/// `hash_derivation_modulo` needs the resolved hash of every input
/// derivation this derivation references; since this goal graph has no
/// bottom-up hash-resolution pass yet, only derivations with no
/// `input_drvs` (or whose already-resolved inputs happen to need no
/// lookup) can be hashed here. Anything else reports `Failed` rather
/// than guessing a hash.
async fn resolve_via_build_trace<S, Sub>(
    scheduler: Arc<Scheduler<S>>,
    drv: &Derivation,
    store_dir: &StoreDir,
    wanted_output: OutputName,
    substituters: Vec<Sub>,
) -> Result<DerivationOutcome, Error>
where
    S: Store + Send + 'static,
    Sub: QueryRealisation + Clone + Send + 'static,
{
    let modulo = match drv.hash_derivation_modulo(store_dir, &BTreeMap::new()) {
        Ok(modulo) => modulo,
        Err(_) => {
            return Ok(DerivationOutcome {
                exit_code: ExitCode::Failed,
                output_path: None,
            });
        }
    };
    let Some(drv_hash) = modulo.hashes.get(wanted_output.as_ref()) else {
        return Ok(DerivationOutcome {
            exit_code: ExitCode::Failed,
            output_path: None,
        });
    };

    let id = DrvOutput {
        drv_hash: *drv_hash,
        output_name: wanted_output,
    };
    let outcome = build_trace_trampoline_goal(scheduler.clone(), id, substituters, RepairFlag::NoRepair).await?;
    let Some(realisation) = outcome.realisation.filter(|_| outcome.exit_code.is_success()) else {
        return Ok(DerivationOutcome {
            exit_code: ExitCode::Failed,
            output_path: None,
        });
    };

    info!(
        "output '{}' resolved via the build trace",
        realisation.out_path
    );
    Ok(DerivationOutcome {
        exit_code: ExitCode::Success,
        output_path: Some(realisation.out_path),
    })
}
