//! SLA Crawler: a deadline-bounded breadth-first site crawler
//!
//! This crate crawls a root URL breadth-first, stores raw page content in a
//! blob store, feeds a full-text search index, and guards the whole system
//! with SLA-based admission control.

pub mod admission;
pub mod blob;
pub mod config;
pub mod crawler;
pub mod dispatch;
pub mod index;
pub mod output;
pub mod retention;
pub mod service;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for crawler operations
#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Blob storage error: {0}")]
    Blob(#[from] blob::BlobError),

    #[error("Search index error: {0}")]
    Index(#[from] index::IndexError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] dispatch::DispatchError),

    #[error("{0}")]
    AdmissionRejected(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
}

impl CrawlerError {
    /// Returns true if this error is contained by the per-page failure boundary
    ///
    /// Page-level errors are recorded on the page row and the crawl moves on.
    /// Everything else fails the whole job.
    pub fn is_page_level(&self) -> bool {
        match self {
            Self::Fetch(e) => !e.is_fatal(),
            Self::Blob(_) | Self::Index(_) => true,
            _ => false,
        }
    }

    /// Returns true if the caller should simply try again later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AdmissionRejected(_))
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for crawler operations
pub type Result<T> = std::result::Result<T, CrawlerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use admission::{AdmissionController, CrawlRequest, JobDescriptor};
pub use config::Config;
pub use crawler::{CrawlEngine, CrawlReport};
pub use state::JobStatus;
pub use url::normalize_links;
