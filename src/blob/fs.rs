//! Filesystem-backed blob store

use super::{BlobError, BlobResult, BlobStore};
use async_trait::async_trait;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Stores each blob as a file under a root directory
///
/// Keys have the form `crawls/{page_id}/{timestamp}.html`, relative to the root.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Creates a store rooted at `root`; the directory is created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves a key to a path, refusing keys that escape the root
    fn path_for(&self, key: &str) -> BlobResult<PathBuf> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !is_plain {
            return Err(BlobError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

/// Builds the storage key for a page body written at the current time
fn blob_key(page_id: i64) -> String {
    let timestamp = Utc::now().format("%Y%m%dT%H%M%S%.6fZ");
    format!("crawls/{}/{}.html", page_id, timestamp)
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn store(&self, page_id: i64, content: &str) -> BlobResult<String> {
        let key = blob_key(page_id);
        let path = self.path_for(&key)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;

        debug!(key = %key, bytes = content.len(), "Stored blob");
        Ok(key)
    }

    async fn retrieve(&self, key: &str) -> BlobResult<Option<String>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
