//! `InputAccessor`: a capability to read one tree of files, backed by any
//! of several storage shapes. Higher-level operations ([`dump_path`],
//! [`fetch_to_store`]) are free functions built only out of the five
//! primitive methods below, so a new backend never has to reimplement NAR
//! serialisation or store ingestion itself.

mod filtering;
mod git_tree;
mod memory;
mod patching;
mod posix;
mod union;
mod zip_archive;

pub use filtering::{FilteringAccessor, PathFilter};
pub use git_tree::GitTreeAccessor;
pub use memory::{MemoryAccessor, MemoryFile};
pub use patching::PatchingAccessor;
pub use posix::PosixAccessor;
pub use union::UnionAccessor;
pub use zip_archive::ZipAccessor;

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use futures::SinkExt as _;
use nixrs::archive::{NarEvent, NarWriter};
use nixrs::hash::{Algorithm, HashSink};
use nixrs::path_info::ValidPathInfo;
use nixrs::store::{CheckSignaturesFlag, RepairFlag, Store};
use nixrs::store_path::{ContentAddress, ContentAddressMethod, StorePath};
use tokio::io::{AsyncWrite, AsyncWriteExt as _};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
    /// Device nodes, sockets, FIFOs — anything `dumpPath` refuses to
    /// serialise.
    Misc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Stat {
    pub file_type: FileType,
    pub is_executable: bool,
}

impl Stat {
    pub fn regular(is_executable: bool) -> Self {
        Stat {
            file_type: FileType::Regular,
            is_executable,
        }
    }

    pub fn directory() -> Self {
        Stat {
            file_type: FileType::Directory,
            is_executable: false,
        }
    }

    pub fn symlink() -> Self {
        Stat {
            file_type: FileType::Symlink,
            is_executable: false,
        }
    }
}

/// Direct children of a directory, each tagged with its type where cheaply
/// knowable (a `lstat`-free backend like `zip` may report `None` and defer
/// the `stat` to a later `maybe_lstat` call).
pub type DirEntries = BTreeMap<String, Option<FileType>>;

/// The one polymorphic seam in this crate: every backend (`posix`,
/// `memory`, `zip`, `git_tree`, `union`, `filtering`, `patching`) is an
/// `InputAccessor`, and nothing above this layer cares which.
#[async_trait]
pub trait InputAccessor: Send + Sync {
    /// A short, human-readable label used in error messages, e.g. the
    /// source directory path or a git URL.
    fn display_name(&self) -> String;

    /// `None` iff `path` does not exist. Never recurses through symlinks.
    async fn maybe_lstat(&self, path: &str) -> Result<Option<Stat>>;

    /// Errors if `path` is not a regular file.
    async fn read_file(&self, path: &str) -> Result<Bytes>;

    /// Errors if `path` is not a directory. Direct children only.
    async fn read_directory(&self, path: &str) -> Result<DirEntries>;

    /// Errors unless `path` is a symlink.
    async fn read_link(&self, path: &str) -> Result<String>;
}

/// A capability plus a canonical path into it: `(accessor, path)`.
/// Cheaply `Clone`, since the accessor is shared behind an `Arc`.
#[derive(Clone)]
pub struct SourcePath {
    accessor: Arc<dyn InputAccessor>,
    path: String,
}

impl SourcePath {
    pub fn new(accessor: Arc<dyn InputAccessor>, path: impl Into<String>) -> Self {
        SourcePath {
            accessor,
            path: canonicalize(&path.into()),
        }
    }

    pub fn accessor(&self) -> &Arc<dyn InputAccessor> {
        &self.accessor
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn child(&self, name: &str) -> SourcePath {
        let path = if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.path, name)
        };
        SourcePath {
            accessor: self.accessor.clone(),
            path: canonicalize(&path),
        }
    }

    pub async fn lstat(&self) -> Result<Stat> {
        self.accessor
            .maybe_lstat(&self.path)
            .await?
            .ok_or_else(|| Error::NotFound(self.path.clone()))
    }

    pub async fn maybe_lstat(&self) -> Result<Option<Stat>> {
        self.accessor.maybe_lstat(&self.path).await
    }

    pub async fn read_file(&self) -> Result<Bytes> {
        self.accessor.read_file(&self.path).await
    }

    pub async fn read_directory(&self) -> Result<DirEntries> {
        self.accessor.read_directory(&self.path).await
    }

    pub async fn read_link(&self) -> Result<String> {
        self.accessor.read_link(&self.path).await
    }

    pub async fn dump_path<W>(&self, sink: W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        dump_path(self.accessor.as_ref(), &self.path, sink).await
    }

    pub async fn fetch_to_store<S>(
        &self,
        store: &mut S,
        name: &str,
        method: ContentAddressMethod,
    ) -> Result<StorePath>
    where
        S: Store + Send,
    {
        fetch_to_store(self.accessor.as_ref(), &self.path, store, name, method).await
    }
}

fn canonicalize(path: &str) -> String {
    let mut parts = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            part => parts.push(part),
        }
    }
    parts.join("/")
}

/// Recursively collects every file, symlink, and directory boundary under
/// `path` into NAR events, using only [`InputAccessor`]'s primitives —
/// the free-function half of `dumpPath`/`hashPath`/`fetchToStore`.
async fn collect_events(
    accessor: &(impl InputAccessor + ?Sized),
    path: &str,
    events: &mut Vec<NarEvent<Cursor<Bytes>>>,
) -> Result<()> {
    let stat = accessor
        .maybe_lstat(path)
        .await?
        .ok_or_else(|| Error::NotFound(path.to_string()))?;
    match stat.file_type {
        FileType::Regular => {
            let contents = accessor.read_file(path).await?;
            events.push(NarEvent::File {
                name: Bytes::new(),
                executable: stat.is_executable,
                size: contents.len() as u64,
                reader: Cursor::new(contents),
            });
        }
        FileType::Symlink => {
            let target = accessor.read_link(path).await?;
            events.push(NarEvent::Symlink {
                name: Bytes::new(),
                target: Bytes::from(target),
            });
        }
        FileType::Directory => {
            events.push(NarEvent::StartDirectory { name: Bytes::new() });
            let entries = accessor.read_directory(path).await?;
            for name in entries.keys() {
                let child_path = if path.is_empty() {
                    name.clone()
                } else {
                    format!("{path}/{name}")
                };
                collect_child(accessor, &child_path, name, events).await?;
            }
            events.push(NarEvent::EndDirectory);
        }
        FileType::Misc => {
            return Err(Error::Custom(format!(
                "path '{path}' has a type dumpPath refuses to serialise"
            )));
        }
    }
    Ok(())
}

async fn collect_child(
    accessor: &(impl InputAccessor + ?Sized),
    child_path: &str,
    name: &str,
    events: &mut Vec<NarEvent<Cursor<Bytes>>>,
) -> Result<()> {
    let mut child_events = Vec::new();
    Box::pin(collect_events(accessor, child_path, &mut child_events)).await?;
    if let Some(first) = child_events.first_mut() {
        rename_event(first, name);
    }
    events.extend(child_events);
    Ok(())
}

fn rename_event(event: &mut NarEvent<Cursor<Bytes>>, name: &str) {
    let new_name = Bytes::from(name.to_string());
    match event {
        NarEvent::File { name, .. } => *name = new_name,
        NarEvent::Symlink { name, .. } => *name = new_name,
        NarEvent::StartDirectory { name } => *name = new_name,
        NarEvent::EndDirectory => {}
    }
}

/// Serialises the subtree at `path` as a NAR, generically over every
/// backend.
pub async fn dump_path<W>(
    accessor: &(impl InputAccessor + ?Sized),
    path: &str,
    sink: W,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut events = Vec::new();
    collect_events(accessor, path, &mut events).await?;
    let mut writer = NarWriter::new(sink);
    let mut stream = stream::iter(events).map(Ok);
    writer.send_all(&mut stream).await.map_err(Error::from)?;
    writer.close().await.map_err(Error::from)?;
    Ok(())
}

/// Dumps `path` as a NAR, hashes it, computes the resulting fixed-output
/// store path, and adds it to `store` — the accessor-level counterpart of
/// `Store::add_to_store`. Only `Recursive` (whole-tree NAR hash) and `Flat`
/// (single-file hash, `path` must be a regular file) are supported; `Text`
/// addressing has no accessor-level meaning since it hashes a string a
/// caller already holds, not a tree read through this trait, and `Git` is
/// unsupported until a `git`-mode NAR hasher exists in `nixrs::archive`.
pub async fn fetch_to_store<S>(
    accessor: &(impl InputAccessor + ?Sized),
    path: &str,
    store: &mut S,
    name: &str,
    method: ContentAddressMethod,
) -> Result<StorePath>
where
    S: Store + Send,
{
    let mut buf = Vec::new();
    match method {
        ContentAddressMethod::Recursive => {
            dump_path(accessor, path, &mut buf).await?;
        }
        ContentAddressMethod::Flat => {
            buf = accessor.read_file(path).await?.to_vec();
        }
        ContentAddressMethod::Text | ContentAddressMethod::Git => {
            return Err(Error::Custom(format!(
                "fetchToStore does not support the '{method}' content-addressing method"
            )));
        }
    }

    let mut hasher = HashSink::new(Algorithm::SHA256);
    hasher.write_all(&buf).await?;
    let (_, hash) = hasher.finish();

    let ca = ContentAddress::from_hash(method, hash).map_err(|e| Error::Custom(e.to_string()))?;
    let store_path = store
        .store_dir()
        .make_store_path_from_ca(name, ca)
        .map_err(|e| Error::Custom(e.to_string()))?;

    let mut info = ValidPathInfo::new(store_path.clone(), hash);
    info.nar_size = buf.len() as u64;
    info.ca = Some(ca);

    store
        .add_to_store(&info, Cursor::new(buf), RepairFlag::NoRepair, CheckSignaturesFlag::NoCheckSigs)
        .await?;
    Ok(store_path)
}
