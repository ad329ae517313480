//! Retention: page purging and the expired-job sweep
//!
//! Deleting a page row is authoritative; the blob and the index document
//! behind it are cleaned up best-effort and failures are only logged.

use crate::blob::BlobStore;
use crate::index::SearchIndex;
use crate::storage::{lock, JobRecord, PageRecord, SharedStorage, Storage};
use crate::Result;
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Deletes a page row, then its blob and index document
///
/// # Errors
///
/// Only the row deletion and the shared-document lookup can fail the call.
/// Blob and index cleanup errors are logged with `warn!` and swallowed.
///
/// Index documents are keyed by URL, so the document is kept while another
/// crawled row for the same URL still points at it.
pub async fn purge_page(
    storage: &SharedStorage,
    blobs: &dyn BlobStore,
    index: &dyn SearchIndex,
    page: &PageRecord,
) -> Result<()> {
    lock(storage)?.delete_page(page.id)?;

    if let Some(key) = &page.storage_key_raw {
        if let Err(e) = blobs.delete(key).await {
            warn!("Failed to delete blob {} for page {}: {}", key, page.id, e);
        }
    }

    if let Some(doc_id) = &page.search_index_key {
        let shared_doc = lock(storage)?
            .find_most_recent_page(&page.url)?
            .is_some_and(|other| {
                other.last_crawled_at.is_some() && other.search_index_key.as_ref() == Some(doc_id)
            });
        if shared_doc {
            debug!("Keeping index document {} still used by {}", doc_id, page.url);
            return Ok(());
        }
        if let Err(e) = index.delete(doc_id).await {
            warn!(
                "Failed to delete index document {} for page {}: {}",
                doc_id, page.id, e
            );
        }
    }

    Ok(())
}

/// One job selected by the sweep
#[derive(Debug, Clone, Serialize)]
pub struct SweptJob {
    pub job_id: Uuid,
    pub url: String,
    pub pages: usize,
}

/// Result of a retention sweep
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub dry_run: bool,
    pub jobs: Vec<SweptJob>,
    pub pages_deleted: usize,
}

/// Deletes jobs requested more than `max_age` ago, with all their pages
///
/// With `dry_run` nothing is deleted; the report lists what would be.
pub async fn sweep_expired_jobs(
    storage: &SharedStorage,
    blobs: &dyn BlobStore,
    index: &dyn SearchIndex,
    max_age: Duration,
    dry_run: bool,
) -> Result<SweepReport> {
    let cutoff = chrono::Duration::from_std(max_age)
        .ok()
        .and_then(|age| Utc::now().checked_sub_signed(age));
    let Some(cutoff) = cutoff else {
        return Ok(SweepReport {
            dry_run,
            ..SweepReport::default()
        });
    };

    let expired: Vec<JobRecord> = lock(storage)?.jobs_requested_before(cutoff)?;
    let mut report = SweepReport {
        dry_run,
        ..SweepReport::default()
    };

    for job in expired {
        let pages = lock(storage)?.pages_for_job(job.id)?;
        report.jobs.push(SweptJob {
            job_id: job.id,
            url: job.url.clone(),
            pages: pages.len(),
        });

        if dry_run {
            continue;
        }

        for page in &pages {
            purge_page(storage, blobs, index, page).await?;
            report.pages_deleted += 1;
        }
        lock(storage)?.delete_job(job.id)?;
        info!("Deleted job {} ({} pages)", job.id, pages.len());
    }

    Ok(report)
}
