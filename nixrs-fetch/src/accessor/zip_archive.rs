use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use zip::ZipArchive;

use crate::error::{Error, Result};

use super::{DirEntries, FileType, InputAccessor, Stat};

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;
const S_IFDIR: u32 = 0o040000;

#[derive(Debug, Clone, Copy)]
struct EntryMeta {
    index: usize,
    stat: Stat,
}

/// Reads a zip archive without unpacking it, the backend behind `fetchzip`
/// and tarball-scheme inputs the fetcher decides are actually zip files.
/// The central directory is indexed once at construction time, so every
/// later call is a lookup plus (for `read_file`) one entry decompression.
pub struct ZipAccessor {
    display_name: String,
    archive: Mutex<ZipArchive<Cursor<Bytes>>>,
    entries: BTreeMap<String, EntryMeta>,
}

impl ZipAccessor {
    pub fn new(display_name: impl Into<String>, data: Bytes) -> Result<Self> {
        let mut archive =
            ZipArchive::new(Cursor::new(data)).map_err(|e| Error::Custom(e.to_string()))?;

        let mut entries = BTreeMap::new();
        for index in 0..archive.len() {
            let file = archive
                .by_index(index)
                .map_err(|e| Error::Custom(e.to_string()))?;
            let name = file.name().trim_end_matches('/').to_string();
            if name.is_empty() {
                continue;
            }
            let mode = file.unix_mode().unwrap_or(0o100644);
            let file_type = if file.is_dir() || mode & S_IFMT == S_IFDIR {
                FileType::Directory
            } else if mode & S_IFMT == S_IFLNK {
                FileType::Symlink
            } else {
                FileType::Regular
            };
            let is_executable = file_type == FileType::Regular && mode & 0o111 != 0;
            entries.insert(
                name,
                EntryMeta {
                    index,
                    stat: Stat {
                        file_type,
                        is_executable,
                    },
                },
            );
        }

        Ok(ZipAccessor {
            display_name: display_name.into(),
            archive: Mutex::new(archive),
            entries,
        })
    }

    fn is_directory(&self, path: &str) -> bool {
        path.is_empty()
            || self
                .entries
                .get(path)
                .map(|meta| meta.stat.file_type == FileType::Directory)
                .unwrap_or(false)
    }
}

#[async_trait]
impl InputAccessor for ZipAccessor {
    fn display_name(&self) -> String {
        self.display_name.clone()
    }

    async fn maybe_lstat(&self, path: &str) -> Result<Option<Stat>> {
        if path.is_empty() {
            return Ok(Some(Stat::directory()));
        }
        Ok(self.entries.get(path).map(|meta| meta.stat))
    }

    async fn read_file(&self, path: &str) -> Result<Bytes> {
        let meta = self
            .entries
            .get(path)
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        if meta.stat.file_type != FileType::Regular {
            return Err(Error::NotAFile(path.to_string()));
        }
        let mut archive = self.archive.lock().expect("zip archive mutex poisoned");
        let mut file = archive
            .by_index(meta.index)
            .map_err(|e| Error::Custom(e.to_string()))?;
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    async fn read_directory(&self, path: &str) -> Result<DirEntries> {
        if !self.is_directory(path) {
            return Err(Error::NotADirectory(path.to_string()));
        }
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };
        let mut children = DirEntries::new();
        for (name, meta) in &self.entries {
            let Some(rest) = name.strip_prefix(&prefix) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            match rest.split_once('/') {
                None => {
                    children.insert(rest.to_string(), Some(meta.stat.file_type));
                }
                Some((top, _)) => {
                    children.entry(top.to_string()).or_insert(Some(FileType::Directory));
                }
            }
        }
        Ok(children)
    }

    async fn read_link(&self, path: &str) -> Result<String> {
        let meta = self
            .entries
            .get(path)
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        if meta.stat.file_type != FileType::Symlink {
            return Err(Error::NotASymlink(path.to_string()));
        }
        let mut archive = self.archive.lock().expect("zip archive mutex poisoned");
        let mut file = archive
            .by_index(meta.index)
            .map_err(|e| Error::Custom(e.to_string()))?;
        let mut target = String::new();
        file.read_to_string(&mut target)?;
        Ok(target)
    }
}
