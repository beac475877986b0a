use nixrs::store::{copy_paths, Error, Store, SubstituteFlag};
use nixrs::store_path::{StoreDirProvider, StorePathSet};
use tracing::info;

/// Copies `paths` (and whatever of their closure is missing) from
/// `substituter` into `local`, skipping anything `local` already has.
pub async fn substitute<S, D>(
    mut substituter: S,
    mut local: D,
    paths: StorePathSet,
) -> Result<(), Error>
where
    S: Store,
    D: Store + Send,
{
    let store_dir = local.store_dir();
    let valid = local
        .query_valid_paths(&paths, SubstituteFlag::NoSubstitute)
        .await?;
    for path in paths.difference(&valid) {
        info!("substituting '{}'...", store_dir.print_path(path));
    }
    copy_paths(&mut substituter, &mut local, &paths).await
}
