use std::collections::BTreeMap;
use std::path::Path;

use nixrs::derivation::{BasicDerivation, Derivation};
use nixrs::store::{BuildSettings, Error, Store};
use nixrs::store_path::{StoreDirProvider, StorePath};
use tokio::io::{stdout, AsyncWriteExt};
use tracing::info;

/// Reads a `.drv` file, builds it through `store`, and streams the build log
/// to stdout.
pub async fn build<S: Store>(mut store: S, drv_path: &Path) -> Result<(), Error> {
    let store_dir = store.store_dir();
    let store_path = store_dir.follow_links_to_store_path(drv_path).await?;
    let text = tokio::fs::read_to_string(drv_path).await?;
    let drv = Derivation::from_aterm_str(&store_dir, store_path.name(), &text)?;
    let basic = to_basic_derivation(store_path.clone(), &drv);

    info!("building '{}'...", store_dir.print_path(&store_path));
    let settings = BuildSettings::default();
    let result = store
        .build_derivation(&store_path, &basic, &settings, stdout())
        .await?;
    stdout().flush().await?;
    info!(status = ?result.status, "build finished");
    Ok(())
}

/// Projects the graph-level [`Derivation`] down to the wire-level
/// [`BasicDerivation`] the `build_derivation` RPC expects: same output/env
/// data, `input_drvs` keys flattened away since the daemon only needs the
/// resolved `input_srcs` closure, not the edges that produced it.
fn to_basic_derivation(drv_path: StorePath, drv: &Derivation) -> BasicDerivation {
    let mut input_srcs = drv.input_srcs.clone();
    input_srcs.extend(drv.input_drvs.keys().cloned());

    let mut env = BTreeMap::new();
    for (k, v) in &drv.env {
        env.insert(k.clone().into(), v.clone().into());
    }

    BasicDerivation {
        drv_path,
        outputs: drv.outputs.clone(),
        input_srcs,
        platform: drv.platform.clone().into(),
        builder: drv.builder.clone().into(),
        args: drv.args.iter().map(|a| a.clone().into()).collect(),
        env,
    }
}
