use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};

use super::{DirEntries, InputAccessor, Stat};

/// An in-memory tree, entirely built up front by whoever constructs it —
/// the backend the `tarball` and `zip` schemes decompress into before an
/// accessor exists to read the archive lazily, and what unit tests build
/// trees out of instead of touching a real filesystem.
#[derive(Debug, Clone)]
pub enum MemoryFile {
    Regular { executable: bool, contents: Bytes },
    Directory { entries: BTreeMap<String, MemoryFile> },
    Symlink { target: String },
}

impl MemoryFile {
    pub fn file(contents: impl Into<Bytes>) -> Self {
        MemoryFile::Regular {
            executable: false,
            contents: contents.into(),
        }
    }

    pub fn executable(contents: impl Into<Bytes>) -> Self {
        MemoryFile::Regular {
            executable: true,
            contents: contents.into(),
        }
    }

    pub fn directory(entries: impl IntoIterator<Item = (String, MemoryFile)>) -> Self {
        MemoryFile::Directory {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn symlink(target: impl Into<String>) -> Self {
        MemoryFile::Symlink {
            target: target.into(),
        }
    }

    fn stat(&self) -> Stat {
        match self {
            MemoryFile::Regular { executable, .. } => Stat::regular(*executable),
            MemoryFile::Directory { .. } => Stat::directory(),
            MemoryFile::Symlink { .. } => Stat::symlink(),
        }
    }

    fn lookup(&self, path: &str) -> Option<&MemoryFile> {
        if path.is_empty() {
            return Some(self);
        }
        let mut node = self;
        for part in path.split('/') {
            match node {
                MemoryFile::Directory { entries } => node = entries.get(part)?,
                _ => return None,
            }
        }
        Some(node)
    }
}

pub struct MemoryAccessor {
    display_name: String,
    root: RwLock<MemoryFile>,
}

impl MemoryAccessor {
    pub fn new(display_name: impl Into<String>, root: MemoryFile) -> Self {
        MemoryAccessor {
            display_name: display_name.into(),
            root: RwLock::new(root),
        }
    }

    /// Replaces the whole tree, used when a lazily-populated accessor
    /// (a tarball still downloading in the background) finishes filling in.
    pub fn set_root(&self, root: MemoryFile) {
        *self.root.write().expect("memory accessor poisoned") = root;
    }
}

#[async_trait]
impl InputAccessor for MemoryAccessor {
    fn display_name(&self) -> String {
        self.display_name.clone()
    }

    async fn maybe_lstat(&self, path: &str) -> Result<Option<Stat>> {
        let root = self.root.read().expect("memory accessor poisoned");
        Ok(root.lookup(path).map(MemoryFile::stat))
    }

    async fn read_file(&self, path: &str) -> Result<Bytes> {
        let root = self.root.read().expect("memory accessor poisoned");
        match root.lookup(path) {
            Some(MemoryFile::Regular { contents, .. }) => Ok(contents.clone()),
            Some(_) => Err(Error::NotAFile(path.to_string())),
            None => Err(Error::NotFound(path.to_string())),
        }
    }

    async fn read_directory(&self, path: &str) -> Result<DirEntries> {
        let root = self.root.read().expect("memory accessor poisoned");
        match root.lookup(path) {
            Some(MemoryFile::Directory { entries }) => Ok(entries
                .iter()
                .map(|(name, file)| (name.clone(), Some(file.stat().file_type)))
                .collect()),
            Some(_) => Err(Error::NotADirectory(path.to_string())),
            None => Err(Error::NotFound(path.to_string())),
        }
    }

    async fn read_link(&self, path: &str) -> Result<String> {
        let root = self.root.read().expect("memory accessor poisoned");
        match root.lookup(path) {
            Some(MemoryFile::Symlink { target }) => Ok(target.clone()),
            Some(_) => Err(Error::NotASymlink(path.to_string())),
            None => Err(Error::NotFound(path.to_string())),
        }
    }
}
