use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;

use crate::error::{Error, Result};

use super::{DirEntries, FileType, InputAccessor, Stat};

/// Reads directly off the local filesystem, the default backend for
/// `path`-scheme inputs and for the builder's own view of `/`.
///
/// `allowed_prefixes`, when non-empty, restricts every call to paths under
/// one of the listed prefixes — the "optional allow-list of sub-prefixes"
/// the backend table calls for; violating it reports `NotFound` rather
/// than `RestrictedPath` so a caller can't distinguish "outside the
/// sandbox" from "doesn't exist".
pub struct PosixAccessor {
    root: PathBuf,
    allowed_prefixes: Vec<PathBuf>,
}

impl PosixAccessor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        PosixAccessor {
            root: root.into(),
            allowed_prefixes: Vec::new(),
        }
    }

    pub fn with_allowed_prefixes(mut self, prefixes: Vec<PathBuf>) -> Self {
        self.allowed_prefixes = prefixes;
        self
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let full = if path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(path)
        };
        if self.allowed_prefixes.is_empty()
            || self
                .allowed_prefixes
                .iter()
                .any(|prefix| full.starts_with(prefix))
        {
            Ok(full)
        } else {
            Err(Error::NotFound(path.to_string()))
        }
    }
}

fn file_type_of(ft: std::fs::FileType) -> FileType {
    if ft.is_dir() {
        FileType::Directory
    } else if ft.is_symlink() {
        FileType::Symlink
    } else if ft.is_file() {
        FileType::Regular
    } else {
        FileType::Misc
    }
}

#[async_trait]
impl InputAccessor for PosixAccessor {
    fn display_name(&self) -> String {
        self.root.display().to_string()
    }

    async fn maybe_lstat(&self, path: &str) -> Result<Option<Stat>> {
        let full = self.resolve(path)?;
        match fs::symlink_metadata(&full).await {
            Ok(meta) => {
                let file_type = file_type_of(meta.file_type());
                let is_executable =
                    file_type == FileType::Regular && meta.permissions().mode() & 0o111 != 0;
                Ok(Some(Stat {
                    file_type,
                    is_executable,
                }))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn read_file(&self, path: &str) -> Result<Bytes> {
        let full = self.resolve(path)?;
        match self.maybe_lstat(path).await? {
            Some(Stat {
                file_type: FileType::Regular,
                ..
            }) => Ok(Bytes::from(fs::read(&full).await?)),
            _ => Err(Error::NotAFile(path.to_string())),
        }
    }

    async fn read_directory(&self, path: &str) -> Result<DirEntries> {
        let full = self.resolve(path)?;
        match self.maybe_lstat(path).await? {
            Some(Stat {
                file_type: FileType::Directory,
                ..
            }) => {}
            _ => return Err(Error::NotADirectory(path.to_string())),
        }
        let mut entries = DirEntries::new();
        let mut reader = fs::read_dir(&full).await?;
        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry.file_type().await.ok().map(file_type_of);
            entries.insert(name, file_type);
        }
        Ok(entries)
    }

    async fn read_link(&self, path: &str) -> Result<String> {
        let full = self.resolve(path)?;
        match self.maybe_lstat(path).await? {
            Some(Stat {
                file_type: FileType::Symlink,
                ..
            }) => {
                let target = fs::read_link(&full).await?;
                Ok(target.to_string_lossy().into_owned())
            }
            _ => Err(Error::NotASymlink(path.to_string())),
        }
    }
}

/// True if `path` is already inside `store_dir` (the `path`-scheme fast
/// path: re-use the existing store object instead of re-hashing it).
pub fn is_under(path: &Path, store_dir: &Path) -> bool {
    path.starts_with(store_dir)
}
