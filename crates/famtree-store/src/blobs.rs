//! Image binaries on the local filesystem.

use async_trait::async_trait;
use famtree_core::store::{BackendError, BlobStore};
use std::io;
use std::path::{Path, PathBuf};

/// [`BlobStore`] writing each key to `<root>/<key>`.
///
/// Keys are relative `/`-separated paths; the HTTP service serves `root`
/// under `public_base`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    public_base: String,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, BackendError> {
        if key.is_empty() || !key.split('/').all(is_safe_segment) {
            return Err(BackendError(format!("invalid storage key: {key:?}")));
        }
        Ok(self.root.join(key))
    }
}

/// Rejects empty segments, traversal, backslashes and NUL bytes.
fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains('\\')
        && !segment.contains('\0')
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), BackendError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BackendError(format!("{}: {e}", parent.display())))?;
        }

        // Write then rename so a reader never sees a partial file.
        let partial = path.with_extension("part");
        tokio::fs::write(&partial, bytes)
            .await
            .map_err(|e| BackendError(format!("{}: {e}", partial.display())))?;
        tokio::fs::rename(&partial, &path)
            .await
            .map_err(|e| BackendError(format!("{}: {e}", path.display())))?;

        tracing::debug!(key, bytes = bytes.len(), "blob written");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), BackendError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(key, "blob removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BackendError(format!("{}: {e}", path.display()))),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{key}", self.public_base)
    }
}
