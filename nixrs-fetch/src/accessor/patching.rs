use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};

use super::{DirEntries, InputAccessor, Stat};

/// Wraps another accessor and rewrites individual files through unified
/// diffs before anything downstream sees them, the backend behind
/// `fetchpatch`-style post-processing that used to require copying the
/// whole tree into the store just to run `patch` over it.
///
/// Patches only rewrite existing regular files; a patch keyed to a path
/// the inner accessor doesn't have, or that adds/removes a file, is out of
/// scope here, mirroring the "no-generated-tree" constraint of an
/// accessor that has to answer `read_directory` without ever materialising
/// anything to disk.
pub struct PatchingAccessor {
    inner: Arc<dyn InputAccessor>,
    patches: BTreeMap<String, String>,
}

impl PatchingAccessor {
    pub fn new(inner: Arc<dyn InputAccessor>, patches: BTreeMap<String, String>) -> Self {
        PatchingAccessor { inner, patches }
    }
}

#[async_trait]
impl InputAccessor for PatchingAccessor {
    fn display_name(&self) -> String {
        self.inner.display_name()
    }

    async fn maybe_lstat(&self, path: &str) -> Result<Option<Stat>> {
        self.inner.maybe_lstat(path).await
    }

    async fn read_file(&self, path: &str) -> Result<Bytes> {
        let contents = self.inner.read_file(path).await?;
        let Some(patch_text) = self.patches.get(path) else {
            return Ok(contents);
        };
        let base = String::from_utf8(contents.to_vec())
            .map_err(|_| Error::Custom(format!("'{path}' is not valid UTF-8 and cannot be patched")))?;
        let patch = diffy::Patch::from_str(patch_text)
            .map_err(|e| Error::Custom(format!("invalid patch for '{path}': {e}")))?;
        let patched = diffy::apply(&base, &patch)
            .map_err(|e| Error::Custom(format!("patch for '{path}' failed to apply: {e}")))?;
        Ok(Bytes::from(patched.into_bytes()))
    }

    async fn read_directory(&self, path: &str) -> Result<DirEntries> {
        self.inner.read_directory(path).await
    }

    async fn read_link(&self, path: &str) -> Result<String> {
        self.inner.read_link(path).await
    }
}
