use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};

use super::{DirEntries, FileType, InputAccessor, Stat};

/// Grafts several accessors together at fixed mount points, e.g. overlaying
/// a generated `flake.lock` accessor onto an otherwise read-only git
/// checkout without copying the checkout.
///
/// Mount points are matched longest-prefix-first and may nest; a path not
/// under any mount resolves against the root mount if one was registered
/// at `""`, otherwise it doesn't exist.
pub struct UnionAccessor {
    display_name: String,
    mounts: BTreeMap<String, Arc<dyn InputAccessor>>,
}

impl UnionAccessor {
    pub fn new(display_name: impl Into<String>) -> Self {
        UnionAccessor {
            display_name: display_name.into(),
            mounts: BTreeMap::new(),
        }
    }

    pub fn mount(mut self, mount_point: impl Into<String>, accessor: Arc<dyn InputAccessor>) -> Self {
        self.mounts.insert(mount_point.into(), accessor);
        self
    }

    fn resolve(&self, path: &str) -> Result<(&Arc<dyn InputAccessor>, String)> {
        let best = self
            .mounts
            .iter()
            .filter(|(mount, _)| {
                mount.is_empty() || path == mount.as_str() || path.starts_with(&format!("{mount}/"))
            })
            .max_by_key(|(mount, _)| mount.len());
        match best {
            Some((mount, accessor)) => {
                let rest = if mount.is_empty() {
                    path.to_string()
                } else {
                    path.strip_prefix(mount.as_str())
                        .unwrap_or("")
                        .trim_start_matches('/')
                        .to_string()
                };
                Ok((accessor, rest))
            }
            None => Err(Error::NotFound(path.to_string())),
        }
    }
}

#[async_trait]
impl InputAccessor for UnionAccessor {
    fn display_name(&self) -> String {
        self.display_name.clone()
    }

    async fn maybe_lstat(&self, path: &str) -> Result<Option<Stat>> {
        if path.is_empty() && !self.mounts.contains_key("") {
            let entries = self.read_directory(path).await?;
            return Ok(if entries.is_empty() && self.mounts.is_empty() {
                None
            } else {
                Some(Stat::directory())
            });
        }
        match self.resolve(path) {
            Ok((accessor, rest)) => accessor.maybe_lstat(&rest).await,
            Err(_) => Ok(None),
        }
    }

    async fn read_file(&self, path: &str) -> Result<Bytes> {
        let (accessor, rest) = self.resolve(path)?;
        accessor.read_file(&rest).await
    }

    async fn read_directory(&self, path: &str) -> Result<DirEntries> {
        if path.is_empty() && !self.mounts.contains_key("") {
            // Synthesize a root listing out of the top-level mount point
            // names, since no single backing accessor owns "" here.
            let mut entries = DirEntries::new();
            for mount in self.mounts.keys() {
                if let Some(top) = mount.split('/').next() {
                    entries.insert(top.to_string(), Some(FileType::Directory));
                }
            }
            return Ok(entries);
        }
        let (accessor, rest) = self.resolve(path)?;
        accessor.read_directory(&rest).await
    }

    async fn read_link(&self, path: &str) -> Result<String> {
        let (accessor, rest) = self.resolve(path)?;
        accessor.read_link(&rest).await
    }
}
