//! Blob storage for raw page content
//!
//! The crawl engine hands every fetched HTML body to a [`BlobStore`] and keeps
//! only the returned key on the page row.

mod fs;

pub use fs::FsBlobStore;

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by blob storage backends
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Blob IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid blob key: {0}")]
    InvalidKey(String),
}

/// Result type for blob operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Durable storage for raw page content
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `content` for a page and returns the storage key
    async fn store(&self, page_id: i64, content: &str) -> BlobResult<String>;

    /// Reads the content behind `key`, or `None` if nothing is stored there
    async fn retrieve(&self, key: &str) -> BlobResult<Option<String>>;

    /// Deletes the content behind `key`; deleting a missing key succeeds
    async fn delete(&self, key: &str) -> BlobResult<()>;
}
