use std::collections::BTreeMap;
use std::sync::Arc;

use futures::TryStreamExt;
use nixrs::archive::{parse_nar, NarEvent};
use nixrs::derivation::Derivation;
use nixrs::derived_path::OutputName;
use nixrs::store::Store;
use nixrs::store_path::{StoreDir, StorePath};
use tokio::io::AsyncReadExt;
use tracing::instrument;

use crate::error::Error;
use crate::exit_code::ExitCode;
use crate::key;
use crate::scheduler::Scheduler;

#[derive(Debug, Clone)]
pub struct ResolutionOutcome {
    pub exit_code: ExitCode,
    pub resolved: Option<(StorePath, Derivation)>,
}

/// Goal #3: `DerivationResolutionGoal`. Decides whether `drv`'s
/// `inputDrvs` can be rewritten to concrete store paths (making the
/// derivation either input-addressed or CA-with-known-inputs), the way
/// the real worker's `tryResolve` does for a derivation whose inputs are
/// already built.
///
/// This goal has no substituters of its own to pull a missing input
/// derivation or output in with, so it can only resolve what is already
/// valid in the local store: every `inputDrvs` entry's `.drv` must
/// itself be readable here, and every one of its wanted outputs must
/// already have a statically-known, valid path. Anything short of that
/// (a missing `.drv`, a `CAFloating`/`Deferred` output, an output not
/// yet built) reports back unresolved rather than failing the goal
/// outright — `DerivationGoal` just carries on with the original,
/// unresolved derivation in that case.
///
/// The actual rewrite is [`Derivation::try_resolve`]; this goal's job is
/// just to build the `(inputDrv, outputName) -> StorePath` lookup that
/// function needs, the way the real worker's `inputGoals` map does it
/// from already-completed sibling goals — except nothing here tracks
/// sibling goals, so each input `.drv` is read straight out of the local
/// store instead.
#[instrument(skip(scheduler, drv), fields(drv_path = %drv_path))]
pub async fn derivation_resolution_goal<S>(
    scheduler: Arc<Scheduler<S>>,
    drv_path: StorePath,
    drv: Derivation,
) -> Result<ResolutionOutcome, Error>
where
    S: Store + Send + 'static,
{
    let goal_key = key::derivation_resolution(scheduler.store_dir(), &drv_path);
    scheduler
        .resolution_goals
        .get_or_init(goal_key, move || run(scheduler.clone(), drv_path, drv))
        .await
}

fn unresolved() -> ResolutionOutcome {
    ResolutionOutcome {
        exit_code: ExitCode::Success,
        resolved: None,
    }
}

async fn run<S>(
    scheduler: Arc<Scheduler<S>>,
    drv_path: StorePath,
    drv: Derivation,
) -> Result<ResolutionOutcome, Error>
where
    S: Store + Send + 'static,
{
    if drv.input_drvs.is_empty() {
        return Ok(unresolved());
    }

    let store_dir = scheduler.store_dir().clone();
    let mut store = scheduler.store();

    // `try_resolve`'s callback is synchronous, so every candidate output
    // path is looked up and validated up front rather than from inside it.
    let mut known_outputs: BTreeMap<(StorePath, OutputName), StorePath> = BTreeMap::new();
    for (input_drv_path, wanted_outputs) in drv.input_drvs.iter() {
        let input_drv = match read_derivation(&mut store, &store_dir, input_drv_path).await? {
            Some(input_drv) => input_drv,
            None => return Ok(unresolved()),
        };

        for output_name in wanted_outputs.iter() {
            let Some(output) = input_drv.outputs.get(output_name.as_ref()) else {
                return Ok(unresolved());
            };
            let resolved_path = match output.path(&store_dir, &input_drv.name, output_name.as_ref()) {
                Ok(Some(path)) => path,
                _ => return Ok(unresolved()),
            };
            if store.query_path_info(&resolved_path).await?.is_none() {
                return Ok(unresolved());
            }
            known_outputs.insert((input_drv_path.clone(), output_name.clone()), resolved_path);
        }
    }

    let Some(resolved) = drv.try_resolve(|drv_path, output_name| {
        known_outputs
            .get(&(drv_path.clone(), output_name.clone()))
            .cloned()
    }) else {
        return Ok(unresolved());
    };

    Ok(ResolutionOutcome {
        exit_code: ExitCode::Success,
        resolved: Some((drv_path, resolved)),
    })
}

/// Reads and parses a `.drv` file out of an arbitrary store path. `.drv`
/// files are always a single regular file, never a directory, so the NAR
/// is exactly one `File` event.
async fn read_derivation<S>(
    store: &mut S,
    store_dir: &StoreDir,
    path: &StorePath,
) -> Result<Option<Derivation>, Error>
where
    S: Store + Send,
{
    if store.query_path_info(path).await?.is_none() {
        return Ok(None);
    }

    let (sink, source) = tokio::io::duplex(64_000);
    let (nar_result, text_result) = tokio::join!(store.nar_from_path(path, sink), async move {
        let mut events = Box::pin(parse_nar(source));
        match events.try_next().await? {
            Some(NarEvent::File { mut reader, .. }) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).await?;
                Ok(buf)
            }
            _ => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "expected a single-file NAR for a .drv path",
            )),
        }
    });
    nar_result?;
    let bytes: Vec<u8> = text_result.map_err(|e| Error::Custom(e.to_string()))?;
    let text = String::from_utf8(bytes).map_err(|e| Error::Custom(e.to_string()))?;

    let name = path
        .name()
        .as_ref()
        .strip_suffix(".drv")
        .unwrap_or(path.name().as_ref());
    let drv = Derivation::from_aterm_str(store_dir, name, &text)
        .map_err(|e| Error::Custom(e.to_string()))?;
    Ok(Some(drv))
}
