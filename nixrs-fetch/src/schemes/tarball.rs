use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use nixrs::store::Store;
use nixrs::store_path::ContentAddressMethod;
use url::Url;

use crate::accessor::{fetch_to_store, DirEntries, InputAccessor, PosixAccessor, Stat};
use crate::error::{Error, Result};
use crate::input::{parse_query_attrs, Attrs, Input};
use crate::lock::LockedInput;
use crate::scheme::InputScheme;

/// Keeps the scratch directory an unpacked tarball lives in alive for as
/// long as the accessor pointing into it, since [`tempfile::TempDir`]
/// deletes itself on drop.
pub(crate) struct TarballAccessor {
    inner: PosixAccessor,
    _scratch: tempfile::TempDir,
}

/// Pairs a [`PosixAccessor`] over an unpacked archive with the scratch
/// directory it reads from, so forge schemes that unpack a tarball the
/// same way `tarball` does don't need to duplicate this wrapper.
pub(crate) fn keep_alive(inner: PosixAccessor, scratch: tempfile::TempDir) -> TarballAccessor {
    TarballAccessor {
        inner,
        _scratch: scratch,
    }
}

#[async_trait]
impl InputAccessor for TarballAccessor {
    fn display_name(&self) -> String {
        self.inner.display_name()
    }

    async fn maybe_lstat(&self, path: &str) -> Result<Option<Stat>> {
        self.inner.maybe_lstat(path).await
    }

    async fn read_file(&self, path: &str) -> Result<Bytes> {
        self.inner.read_file(path).await
    }

    async fn read_directory(&self, path: &str) -> Result<DirEntries> {
        self.inner.read_directory(path).await
    }

    async fn read_link(&self, path: &str) -> Result<String> {
        self.inner.read_link(path).await
    }
}

/// `http(s):` and `tarball:` both resolve to "download one archive, unpack
/// it, treat the result as a tree" — `tarball:` only exists so a `flake.lock`
/// entry can say explicitly "this URL is an archive" rather than relying on
/// the file extension sniffing `http(s)` falls back to.
pub struct TarballScheme;

impl InputScheme for TarballScheme {
    fn scheme_type(&self) -> &'static str {
        "tarball"
    }

    fn input_from_url(&self, url: &Url, _require_tree: bool) -> Result<Option<Input>> {
        let is_tarball_url = url.scheme() == "tarball"
            || matches!(url.scheme(), "http" | "https")
                && looks_like_archive(url.path());
        if !is_tarball_url {
            return Ok(None);
        }
        let mut attrs = parse_query_attrs(url);
        attrs.insert("type".to_string(), "tarball".into());
        let mut inner = url.clone();
        if inner.scheme() == "tarball" {
            inner.set_scheme("https").ok();
        }
        attrs.insert("url".to_string(), inner.as_str().into());
        Ok(Some(Input::new(attrs)))
    }

    fn input_from_attrs(&self, attrs: &Attrs) -> Result<Option<Input>> {
        if attrs.get("url").and_then(|v| v.as_str()).is_none() {
            return Err(Error::InvalidAttr(
                "url".to_string(),
                "required for the 'tarball' scheme".to_string(),
            ));
        }
        Ok(Some(Input::new(attrs.clone())))
    }

    fn allowed_attrs(&self) -> &'static [&'static str] {
        &["type", "url", "narHash", "lastModified"]
    }

    fn to_url(&self, input: &Input) -> Result<Url> {
        let url = input
            .get_str("url")
            .ok_or_else(|| Error::InvalidAttr("url".to_string(), "missing".to_string()))?;
        Url::parse(url).map_err(|e| Error::Custom(e.to_string()))
    }
}

fn looks_like_archive(path: &str) -> bool {
    const EXTENSIONS: &[&str] = &[
        ".tar.gz", ".tar.xz", ".tar.bz2", ".tar.zst", ".tgz", ".tar", ".zip",
    ];
    EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Downloads the archive at `url`, unpacks it under a scratch directory,
/// and ingests the result as a single tree. Archives with exactly one
/// top-level directory entry (the common shape GitHub/GitLab produce) have
/// that directory stripped, so `${flake}/flake.nix` resolves the same way
/// whether the flake came from a tarball or a git checkout.
pub async fn download_and_unpack(url: &Url) -> Result<(PathBuf, tempfile::TempDir)> {
    let response = reqwest::get(url.clone())
        .await
        .map_err(|e| Error::Network(url.to_string(), e.to_string()))?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::Network(url.to_string(), e.to_string()))?
        .to_vec();

    let scratch = tempfile::tempdir()?;
    let dest = scratch.path().to_path_buf();
    let unpack_dest = dest.clone();
    tokio::task::spawn_blocking(move || {
        compress_tools::uncompress_archive(
            std::io::Cursor::new(bytes),
            &unpack_dest,
            compress_tools::Ownership::Ignore,
        )
    })
    .await
    .map_err(|e| Error::Custom(e.to_string()))?
    .map_err(|e| Error::Custom(e.to_string()))?;

    let mut reader = tokio::fs::read_dir(&dest).await?;
    let first = reader.next_entry().await?;
    let second = reader.next_entry().await?;
    let root = match (first, second) {
        (Some(only), None) if only.file_type().await?.is_dir() => only.path(),
        _ => dest.clone(),
    };
    Ok((root, scratch))
}

pub async fn get_accessor<S: Store + Send>(
    store: &mut S,
    input: &Input,
) -> Result<(Arc<dyn InputAccessor>, LockedInput)> {
    let url_str = input
        .get_str("url")
        .ok_or_else(|| Error::InvalidAttr("url".to_string(), "missing".to_string()))?;
    let url = Url::parse(url_str).map_err(|e| Error::Custom(e.to_string()))?;
    let (root, scratch) = download_and_unpack(&url).await?;

    let posix = PosixAccessor::new(&root);
    let name = input.get_str("name").unwrap_or("source");
    let store_path = fetch_to_store(&posix, "", store, name, ContentAddressMethod::Recursive).await?;

    let accessor: Arc<dyn InputAccessor> = Arc::new(TarballAccessor {
        inner: posix,
        _scratch: scratch,
    });
    let locked = LockedInput::new(input.clone(), store_path);
    Ok((accessor, locked))
}
