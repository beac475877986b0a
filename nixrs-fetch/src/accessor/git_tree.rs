use std::path::Path as StdPath;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use git2::{Oid, Repository};

use crate::error::{Error, Result};

use super::{DirEntries, InputAccessor, Stat};

const MODE_TREE: i32 = 0o040000;
const MODE_SYMLINK: i32 = 0o120000;
const MODE_GITLINK: i32 = 0o160000;

/// Reads one commit's tree out of a local git checkout or bare clone,
/// pinned to a single [`Oid`] so the accessor's view never moves even if
/// the underlying ref is force-pushed mid-build. Submodules appear as
/// empty directories, since resolving them recursively would mean letting
/// this accessor reach into another repository's accessor, which the
/// `git` scheme instead does explicitly by fetching each submodule as its
/// own locked input.
pub struct GitTreeAccessor {
    display_name: String,
    repo: Mutex<Repository>,
    commit: Oid,
}

impl GitTreeAccessor {
    pub fn new(display_name: impl Into<String>, repo: Repository, commit: Oid) -> Self {
        GitTreeAccessor {
            display_name: display_name.into(),
            repo: Mutex::new(repo),
            commit,
        }
    }

    fn stat_of_mode(mode: i32) -> Stat {
        if mode & MODE_TREE == MODE_TREE {
            Stat::directory()
        } else if mode == MODE_SYMLINK {
            Stat::symlink()
        } else if mode == MODE_GITLINK {
            Stat::directory()
        } else {
            Stat::regular(mode & 0o111 != 0)
        }
    }
}

#[async_trait]
impl InputAccessor for GitTreeAccessor {
    fn display_name(&self) -> String {
        self.display_name.clone()
    }

    async fn maybe_lstat(&self, path: &str) -> Result<Option<Stat>> {
        let repo = self.repo.lock().expect("git repository mutex poisoned");
        let commit = repo
            .find_commit(self.commit)
            .map_err(|e| Error::Custom(e.to_string()))?;
        let tree = commit.tree().map_err(|e| Error::Custom(e.to_string()))?;
        if path.is_empty() {
            return Ok(Some(Stat::directory()));
        }
        match tree.get_path(StdPath::new(path)) {
            Ok(entry) => Ok(Some(Self::stat_of_mode(entry.filemode()))),
            Err(_) => Ok(None),
        }
    }

    async fn read_file(&self, path: &str) -> Result<Bytes> {
        let repo = self.repo.lock().expect("git repository mutex poisoned");
        let commit = repo
            .find_commit(self.commit)
            .map_err(|e| Error::Custom(e.to_string()))?;
        let tree = commit.tree().map_err(|e| Error::Custom(e.to_string()))?;
        let entry = tree
            .get_path(StdPath::new(path))
            .map_err(|_| Error::NotFound(path.to_string()))?;
        if entry.filemode() & MODE_TREE == MODE_TREE || entry.filemode() == MODE_GITLINK {
            return Err(Error::NotAFile(path.to_string()));
        }
        let object = entry
            .to_object(&repo)
            .map_err(|e| Error::Custom(e.to_string()))?;
        let blob = object
            .as_blob()
            .ok_or_else(|| Error::NotAFile(path.to_string()))?;
        Ok(Bytes::copy_from_slice(blob.content()))
    }

    async fn read_directory(&self, path: &str) -> Result<DirEntries> {
        let repo = self.repo.lock().expect("git repository mutex poisoned");
        let commit = repo
            .find_commit(self.commit)
            .map_err(|e| Error::Custom(e.to_string()))?;
        let root = commit.tree().map_err(|e| Error::Custom(e.to_string()))?;
        let subtree = if path.is_empty() {
            root
        } else {
            let entry = root
                .get_path(StdPath::new(path))
                .map_err(|_| Error::NotFound(path.to_string()))?;
            if entry.filemode() & MODE_TREE != MODE_TREE {
                return Err(Error::NotADirectory(path.to_string()));
            }
            let object = entry
                .to_object(&repo)
                .map_err(|e| Error::Custom(e.to_string()))?;
            object
                .as_tree()
                .ok_or_else(|| Error::NotADirectory(path.to_string()))?
                .clone()
        };

        let mut entries = DirEntries::new();
        for entry in subtree.iter() {
            let Some(name) = entry.name() else { continue };
            entries.insert(name.to_string(), Some(Self::stat_of_mode(entry.filemode()).file_type));
        }
        Ok(entries)
    }

    async fn read_link(&self, path: &str) -> Result<String> {
        let repo = self.repo.lock().expect("git repository mutex poisoned");
        let commit = repo
            .find_commit(self.commit)
            .map_err(|e| Error::Custom(e.to_string()))?;
        let tree = commit.tree().map_err(|e| Error::Custom(e.to_string()))?;
        let entry = tree
            .get_path(StdPath::new(path))
            .map_err(|_| Error::NotFound(path.to_string()))?;
        if entry.filemode() != MODE_SYMLINK {
            return Err(Error::NotASymlink(path.to_string()));
        }
        let object = entry
            .to_object(&repo)
            .map_err(|e| Error::Custom(e.to_string()))?;
        let blob = object
            .as_blob()
            .ok_or_else(|| Error::NotASymlink(path.to_string()))?;
        Ok(String::from_utf8_lossy(blob.content()).into_owned())
    }
}
