//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::JobStatus;
use crate::storage::{JobRecord, NewJob, PageCounts, PageCrawl, PageRecord};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Page not found: {0}")]
    PageNotFound(i64),

    #[error("Invalid job transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines every record-store operation the admission controller,
/// the crawl engine and the service layer need.
pub trait Storage {
    // ===== Job Management =====

    /// Creates a job row with status `queued` and a fresh id
    fn create_job(&mut self, job: &NewJob) -> StorageResult<JobRecord>;

    /// Gets a job by ID
    fn get_job(&self, job_id: Uuid) -> StorageResult<Option<JobRecord>>;

    /// Moves a job from `queued` to `running`, stamping `started_at`
    ///
    /// A job that is already `running` is returned unchanged so a redelivered
    /// task can resume it. Terminal jobs are rejected.
    fn mark_job_running(&mut self, job_id: Uuid, at: DateTime<Utc>) -> StorageResult<JobRecord>;

    /// Moves a `running` job to a terminal status, stamping `finished_at`
    fn finish_job(
        &mut self,
        job_id: Uuid,
        status: JobStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<JobRecord>;

    /// Returns the oldest queued or running job requested before `cutoff`
    fn find_sla_breach(&self, cutoff: DateTime<Utc>) -> StorageResult<Option<JobRecord>>;

    /// Gets every job requested before `cutoff`, oldest first
    fn jobs_requested_before(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<JobRecord>>;

    /// Deletes a job row; remaining pages lose their owner
    fn delete_job(&mut self, job_id: Uuid) -> StorageResult<()>;

    /// Counts jobs by lifecycle status
    fn count_jobs_by_status(&self) -> StorageResult<HashMap<JobStatus, u64>>;

    // ===== Page Management =====

    /// Finds the most recently crawled row for a URL across all jobs
    ///
    /// Rows with a successful crawl win over rows without one.
    fn find_most_recent_page(&self, url: &str) -> StorageResult<Option<PageRecord>>;

    /// Finds the row a specific job holds for a URL
    fn find_page(&self, job_id: Uuid, url: &str) -> StorageResult<Option<PageRecord>>;

    /// Creates an empty page row and returns its ID
    fn create_page(&mut self, job_id: Uuid, url: &str) -> StorageResult<i64>;

    /// Records a successful crawl and clears any previous error
    fn record_page_success(&mut self, page_id: i64, crawl: &PageCrawl) -> StorageResult<()>;

    /// Records a failed crawl attempt
    fn record_page_error(&mut self, page_id: i64, error: &str) -> StorageResult<()>;

    /// Gets a page by ID
    fn get_page(&self, page_id: i64) -> StorageResult<Option<PageRecord>>;

    /// Deletes a page row
    fn delete_page(&mut self, page_id: i64) -> StorageResult<()>;

    /// Gets every page row owned by a job
    fn pages_for_job(&self, job_id: Uuid) -> StorageResult<Vec<PageRecord>>;

    /// Counts a job's successfully crawled pages
    fn count_crawled_pages(&self, job_id: Uuid) -> StorageResult<u64>;

    /// Counts pages across all jobs
    fn count_pages(&self) -> StorageResult<PageCounts>;
}
