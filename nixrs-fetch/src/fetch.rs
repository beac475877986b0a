use std::sync::Arc;

use nixrs::store::Store;

use crate::accessor::InputAccessor;
use crate::cache::FetcherCache;
use crate::error::{Error, Result};
use crate::input::Input;
use crate::lock::LockedInput;
use crate::schemes;

/// Fetches `input`, consulting and then populating `cache`'s attrs cache.
/// This is the one place that knows about every scheme's store-touching
/// half, since [`crate::scheme::InputScheme`] itself can't carry a method
/// generic over `S: Store` — see [`crate::scheme`]'s module docs.
pub async fn fetch_to_accessor<S: Store + Send>(
    store: &mut S,
    input: &Input,
    cache: &FetcherCache,
) -> Result<(Arc<dyn InputAccessor>, LockedInput)> {
    let scheme_type = input
        .scheme_type()
        .ok_or_else(|| Error::InvalidAttr("type".to_string(), "missing".to_string()))?
        .to_string();

    if let Some((_, store_path, expired)) = cache.lookup_attrs(input) {
        if !expired {
            let path = store.store_dir().print_path(&store_path);
            let accessor = crate::accessor::PosixAccessor::new(path);
            let locked = LockedInput::new(input.clone(), store_path);
            return Ok((Arc::new(accessor), locked));
        }
    }

    let (accessor, locked) = match scheme_type.as_str() {
        "path" => schemes::path::get_accessor(store, input).await?,
        "file" => schemes::file::get_accessor(store, input).await?,
        "tarball" => schemes::tarball::get_accessor(store, input).await?,
        "git" => schemes::git::get_accessor(store, input).await?,
        forge @ ("github" | "gitlab" | "sourcehut") => {
            schemes::forge::get_accessor(forge, store, input).await?
        }
        vcs @ ("hg" | "fsl" | "pijul") => schemes::vcs_cli::get_accessor(vcs, store, input).await?,
        other => return Err(Error::UnsupportedScheme(other.to_string())),
    };

    cache.insert_attrs(input, locked.input.attrs().clone(), locked.store_path.clone());
    Ok((accessor, locked))
}
