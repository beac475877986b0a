use std::path::PathBuf;

use nixrs::hash::HashSink;
use nixrs::store::{Error, Store};
use nixrs::store_path::StoreDirProvider;
use tracing::{error, info};

/// Verify whether the contents of the given store paths have not changed
/// since they were registered, by re-dumping the NAR and comparing hashes.
pub async fn verify_path<S: Store>(mut store: S, paths: &[PathBuf]) -> Result<(), Error> {
    let store_dir = store.store_dir();
    let mut ret = Ok(());
    for path in paths {
        let store_path = store_dir.follow_links_to_store_path(path).await?;
        let sp_s = store_dir.print_path(&store_path);
        info!("checking path '{}'...", sp_s);
        let Some(info) = store.query_path_info(&store_path).await? else {
            error!("path '{}' is not valid", sp_s);
            ret = Err(Error::Custom(1, "some invalid paths".into()));
            continue;
        };
        let mut sink = HashSink::new(info.nar_hash.algorithm());
        store.nar_from_path(&store_path, &mut sink).await?;
        let (_size, current) = sink.finish();
        if current != info.nar_hash {
            error!(
                "path '{}' was modified! expected hash '{}', got '{}'",
                sp_s, info.nar_hash, current
            );
            ret = Err(Error::Custom(1, "some modified paths".into()));
        }
    }
    ret
}
