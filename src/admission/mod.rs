//! Admission control
//!
//! A new job is accepted only while the whole system meets its SLA: if any
//! queued or running job was requested longer ago than the SLA duration,
//! every submission is rejected until that job finishes or is cleaned up.

use crate::config::CrawlerConfig;
use crate::state::JobStatus;
use crate::storage::{lock, JobRecord, NewJob, SharedStorage, Storage};
use crate::url::is_crawlable_url;
use crate::{CrawlerError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Message returned to callers while admission is closed
pub const SLA_REJECTION_MESSAGE: &str =
    "SLA exceeded; new crawl jobs are not accepted at this time, try later";

/// A crawl submission as received from a caller
///
/// Limits are signed so that zero and negative values can be reported as
/// invalid input instead of failing to parse.
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    pub url: String,
    pub max_depth: Option<i64>,
    pub max_pages: Option<i64>,
}

impl CrawlRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_depth: None,
            max_pages: None,
        }
    }

    pub fn with_max_depth(mut self, max_depth: i64) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_max_pages(mut self, max_pages: i64) -> Self {
        self.max_pages = Some(max_pages);
        self
    }
}

/// An accepted job, as handed to the dispatcher
#[derive(Debug, Clone, Serialize)]
pub struct JobDescriptor {
    pub job_id: Uuid,
    pub url: String,
    pub status: JobStatus,
    pub max_depth: u32,
    pub max_pages: u32,
    pub requested_at: DateTime<Utc>,
}

impl From<JobRecord> for JobDescriptor {
    fn from(job: JobRecord) -> Self {
        Self {
            job_id: job.id,
            url: job.url,
            status: job.status,
            max_depth: job.max_depth,
            max_pages: job.max_pages,
            requested_at: job.requested_at,
        }
    }
}

/// Gatekeeper for job creation
pub struct AdmissionController {
    storage: SharedStorage,
    sla_duration: Duration,
    default_max_depth: u32,
    default_max_pages: u32,
}

impl AdmissionController {
    pub fn new(storage: SharedStorage, config: &CrawlerConfig) -> Self {
        Self {
            storage,
            sla_duration: config.sla_duration(),
            default_max_depth: config.default_max_depth,
            default_max_pages: config.default_max_pages,
        }
    }

    /// The SLA every admitted job runs under
    pub fn sla_duration(&self) -> Duration {
        self.sla_duration
    }

    /// Validates a submission, checks SLA health and creates a queued job
    ///
    /// # Arguments
    ///
    /// * `request` - The submission; missing limits take the configured defaults
    ///
    /// # Returns
    ///
    /// * `Ok(JobDescriptor)` - The job was created with status `queued`
    /// * `Err(CrawlerError::Validation)` - Bad URL or limits; nothing was written
    /// * `Err(CrawlerError::AdmissionRejected)` - The SLA is breached; try later
    pub fn admit(&self, request: &CrawlRequest) -> Result<JobDescriptor> {
        let url = request.url.trim();
        if !is_crawlable_url(url) {
            return Err(CrawlerError::Validation(format!(
                "url must be an absolute http(s) URL, got '{}'",
                request.url
            )));
        }
        let max_depth = resolve_limit("max_depth", request.max_depth, self.default_max_depth)?;
        let max_pages = resolve_limit("max_pages", request.max_pages, self.default_max_pages)?;

        let now = Utc::now();
        let cutoff = chrono::Duration::from_std(self.sla_duration)
            .ok()
            .and_then(|sla| now.checked_sub_signed(sla));

        // Scan and insert under one lock so no job slips past a breach
        let mut storage = lock(&self.storage)?;
        if let Some(cutoff) = cutoff {
            if let Some(stuck) = storage.find_sla_breach(cutoff)? {
                warn!(
                    "Rejecting crawl of {}: job {} ({}) requested at {} is past its SLA",
                    url, stuck.id, stuck.status, stuck.requested_at
                );
                return Err(CrawlerError::AdmissionRejected(
                    SLA_REJECTION_MESSAGE.to_string(),
                ));
            }
        }

        let job = storage.create_job(&NewJob {
            url: url.to_string(),
            max_depth,
            max_pages,
            requested_at: now,
        })?;

        info!("Admitted job {} for {}", job.id, job.url);
        Ok(job.into())
    }
}

/// Applies the default and rejects limits below 1
fn resolve_limit(name: &str, value: Option<i64>, default: u32) -> Result<u32> {
    match value {
        None => Ok(default),
        Some(v) if v < 1 => Err(CrawlerError::Validation(format!(
            "{} must be at least 1, got {}",
            name, v
        ))),
        Some(v) => u32::try_from(v)
            .map_err(|_| CrawlerError::Validation(format!("{} is too large: {}", name, v))),
    }
}
