//! Storage module for the job and page record store
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Job lifecycle persistence and the SLA breach scan
//! - Page rows used as visited markers and as the freshness cache

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::JobStatus;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

/// Storage handle shared by the admission controller and every worker
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// Wraps a storage backend for sharing across tasks
pub fn shared(storage: SqliteStorage) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Locks the shared storage, surfacing lock poisoning as a storage error
pub fn lock(storage: &SharedStorage) -> StorageResult<MutexGuard<'_, SqliteStorage>> {
    storage
        .lock()
        .map_err(|_| StorageError::Database("storage lock poisoned".to_string()))
}

/// Represents a crawl job in the database
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: Uuid,
    pub url: String,
    pub status: JobStatus,
    pub requested_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub max_depth: u32,
    pub max_pages: u32,
}

/// Values needed to create a job row
#[derive(Debug, Clone)]
pub struct NewJob {
    pub url: String,
    pub max_depth: u32,
    pub max_pages: u32,
    pub requested_at: DateTime<Utc>,
}

/// Represents a page in the database
#[derive(Debug, Clone)]
pub struct PageRecord {
    pub id: i64,
    pub job_id: Option<Uuid>,
    pub url: String,
    pub last_crawled_at: Option<DateTime<Utc>>,
    pub http_status: Option<u16>,
    pub storage_key_raw: Option<String>,
    pub search_index_key: Option<String>,
    pub error: Option<String>,
}

impl PageRecord {
    /// Returns true if the page was successfully crawled within `window` of `now`
    ///
    /// A page that never succeeded is never fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let Ok(window) = chrono::Duration::from_std(window) else {
            return self.last_crawled_at.is_some();
        };
        self.last_crawled_at
            .map(|crawled| crawled >= now - window)
            .unwrap_or(false)
    }
}

/// Outcome of a successful fetch, written to the page row in one update
#[derive(Debug, Clone)]
pub struct PageCrawl {
    pub crawled_at: DateTime<Utc>,
    pub http_status: u16,
    pub storage_key_raw: String,
    pub search_index_key: String,
}

/// Page totals across all jobs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PageCounts {
    pub total: u64,
    pub crawled: u64,
    pub failed: u64,
}

/// Formats a timestamp for storage
///
/// Fixed-width UTC with microseconds, so string order equals time order.
pub fn to_db_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a timestamp written by [`to_db_time`]
pub fn from_db_time(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|t| t.with_timezone(&Utc))
}
