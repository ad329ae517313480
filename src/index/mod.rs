//! Full-text search index over crawled pages
//!
//! The crawl engine submits the plain text of every fetched page through the
//! [`SearchIndex`] trait; the service layer queries it.

mod sqlite_fts;

pub use sqlite_fts::SqliteSearchIndex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors raised by search index backends
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Index backend error: {0}")]
    Backend(#[from] rusqlite::Error),

    #[error("Index lock poisoned")]
    Poisoned,
}

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// A page submitted for indexing
#[derive(Debug, Clone)]
pub struct IndexDocument {
    pub url: String,
    pub title: String,
    pub content: String,
    pub page_id: i64,
    pub crawled_at: DateTime<Utc>,
}

/// One ranked search result
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub score: f64,
}

/// A page of search results plus the total match count
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct SearchResults {
    pub total: u64,
    pub hits: Vec<SearchHit>,
}

/// Full-text index of crawled pages
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Indexes a document and returns its document id
    async fn index(&self, doc: IndexDocument) -> IndexResult<String>;

    /// Removes a document from the index
    async fn delete(&self, doc_id: &str) -> IndexResult<()>;

    /// Runs a query, returning at most `size` hits starting at `offset`
    async fn search(&self, query: &str, size: usize, offset: usize) -> IndexResult<SearchResults>;

    /// Makes recently indexed documents visible to searches
    async fn refresh(&self) -> IndexResult<()>;
}

/// Derives the document id for a URL
///
/// One document per URL: re-indexing the same URL replaces the old document.
pub fn document_id(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
