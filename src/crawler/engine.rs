//! Crawl engine - runs one job from `queued` to a terminal state
//!
//! The engine owns the per-job traversal:
//! - Driving the job through its lifecycle
//! - Walking the frontier breadth-first under the depth and page limits
//! - Stopping cooperatively at the SLA deadline
//! - Consulting the freshness cache before every fetch
//! - Containing page-level failures so one bad URL never aborts the job

use crate::blob::BlobStore;
use crate::config::{CrawlerConfig, StaleScope};
use crate::crawler::fetcher::{FetchSession, Fetcher};
use crate::crawler::frontier::{Frontier, FrontierEntry};
use crate::dispatch::CrawlTask;
use crate::index::{IndexDocument, SearchIndex};
use crate::retention::purge_page;
use crate::state::JobStatus;
use crate::storage::{lock, JobRecord, PageCrawl, SharedStorage, Storage};
use crate::url::{normalize_links, strip_trailing_slash};
use crate::{CrawlerError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Engine settings taken from the `[crawler]` config section
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// How long a successful crawl stays fresh
    pub page_expiry: Duration,

    /// Which stale rows are deleted before a re-fetch
    pub stale_scope: StaleScope,
}

impl From<&CrawlerConfig> for EngineSettings {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            page_expiry: config.page_expiry(),
            stale_scope: config.stale_scope,
        }
    }
}

/// Why the traversal loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    FrontierExhausted,
    PageBudget,
    Deadline,
    /// The job was already terminal when the task arrived
    AlreadyTerminal,
}

/// Summary of one job run
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub job_id: Uuid,
    pub status: JobStatus,
    /// Page rows created in this run (the page budget tally)
    pub attempted: u32,
    pub fetched: u32,
    pub failed: u32,
    /// Frontier entries skipped as fresh or already visited
    pub skipped: u32,
    pub stop_reason: StopReason,
}

impl CrawlReport {
    fn new(job_id: Uuid, status: JobStatus) -> Self {
        Self {
            job_id,
            status,
            attempted: 0,
            fetched: 0,
            failed: 0,
            skipped: 0,
            stop_reason: StopReason::FrontierExhausted,
        }
    }
}

/// Outcome of the freshness check for a popped URL
enum Freshness {
    /// A recent successful crawl exists; skip the URL
    Fresh,
    /// Stale rows were cleared; the URL may be crawled
    Crawl,
}

/// Runs crawl jobs against injected collaborators
///
/// One engine is built per process and shared by every worker. Each call to
/// [`CrawlEngine::run`] processes one job sequentially with its own fetch
/// session.
pub struct CrawlEngine {
    storage: SharedStorage,
    fetcher: Arc<dyn Fetcher>,
    blobs: Arc<dyn BlobStore>,
    index: Arc<dyn SearchIndex>,
    settings: EngineSettings,
}

impl CrawlEngine {
    pub fn new(
        storage: SharedStorage,
        fetcher: Arc<dyn Fetcher>,
        blobs: Arc<dyn BlobStore>,
        index: Arc<dyn SearchIndex>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            storage,
            fetcher,
            blobs,
            index,
            settings,
        }
    }

    /// Runs a job to completion or failure
    ///
    /// A terminal job is left untouched. A `running` job (a redelivered task)
    /// resumes; pages still fresh from the earlier attempt are skipped.
    ///
    /// # Errors
    ///
    /// Any error outside the per-page failure boundary marks the job failed
    /// and is returned so the task facility can apply its retry policy.
    pub async fn run(&self, task: &CrawlTask) -> Result<CrawlReport> {
        let existing = lock(&self.storage)?.get_job(task.job_id)?;
        let job = existing.ok_or_else(|| CrawlerError::NotFound {
            kind: "job",
            id: task.job_id.to_string(),
        })?;

        if job.status.is_terminal() {
            info!("Job {} is already {}, nothing to do", job.id, job.status);
            let mut report = CrawlReport::new(job.id, job.status);
            report.stop_reason = StopReason::AlreadyTerminal;
            return Ok(report);
        }

        let job = lock(&self.storage)?.mark_job_running(job.id, Utc::now())?;
        info!(
            "Job {} running: {} (max depth {}, max pages {})",
            job.id, task.url, task.max_depth, task.max_pages
        );

        match self.execute(&job, task).await {
            Ok(mut report) => {
                let finished = lock(&self.storage).and_then(|mut storage| {
                    storage.finish_job(job.id, JobStatus::Completed, Utc::now())
                });
                match finished {
                    Ok(_) => {
                        report.status = JobStatus::Completed;
                        info!(
                            "Job {} completed ({:?}): {} attempted, {} fetched, {} failed, {} skipped",
                            job.id,
                            report.stop_reason,
                            report.attempted,
                            report.fetched,
                            report.failed,
                            report.skipped
                        );
                        Ok(report)
                    }
                    Err(e) => Err(self.fail_job(job.id, e.into())),
                }
            }
            Err(e) => Err(self.fail_job(job.id, e)),
        }
    }

    /// Marks the job failed and hands the original error back
    fn fail_job(&self, job_id: Uuid, cause: CrawlerError) -> CrawlerError {
        error!("Job {} failed: {}", job_id, cause);

        let marked = lock(&self.storage)
            .and_then(|mut storage| storage.finish_job(job_id, JobStatus::Failed, Utc::now()));
        if let Err(e) = marked {
            error!("Could not mark job {} as failed: {}", job_id, e);
        }

        cause
    }

    /// Opens the fetch session, traverses, and always releases the session
    async fn execute(&self, job: &JobRecord, task: &CrawlTask) -> Result<CrawlReport> {
        let deadline = chrono::Duration::from_std(task.sla_duration)
            .ok()
            .and_then(|sla| job.requested_at.checked_add_signed(sla));

        let mut session = self.fetcher.open_session().await?;
        let outcome = self.traverse(session.as_mut(), job.id, task, deadline).await;
        session.close().await;

        let report = outcome?;
        self.index.refresh().await?;
        Ok(report)
    }

    /// The breadth-first loop
    async fn traverse(
        &self,
        session: &mut dyn FetchSession,
        job_id: Uuid,
        task: &CrawlTask,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<CrawlReport> {
        let mut report = CrawlReport::new(job_id, JobStatus::Running);
        // Root follows the same trailing-slash rule as child links
        let mut frontier = Frontier::seeded(strip_trailing_slash(&task.url));
        let mut visited: HashSet<String> = HashSet::new();

        report.stop_reason = loop {
            if frontier.is_empty() {
                break StopReason::FrontierExhausted;
            }
            if deadline.is_some_and(|d| Utc::now() >= d) {
                info!("Job {} reached its SLA deadline with {} URLs queued", job_id, frontier.len());
                break StopReason::Deadline;
            }
            if report.attempted >= task.max_pages {
                break StopReason::PageBudget;
            }
            let Some(entry) = frontier.pop() else {
                break StopReason::FrontierExhausted;
            };

            if !visited.insert(entry.url.clone()) {
                report.skipped += 1;
                continue;
            }

            if let Freshness::Fresh = self.check_freshness(job_id, &entry.url).await? {
                debug!("Skipping fresh page {}", entry.url);
                report.skipped += 1;
                continue;
            }

            let page_id = lock(&self.storage)?.create_page(job_id, &entry.url)?;
            report.attempted += 1;
            debug!("Crawling {} (depth {}, page {})", entry.url, entry.depth, page_id);

            match self.crawl_page(session, page_id, &entry).await {
                Ok(links) => {
                    report.fetched += 1;
                    if entry.depth < task.max_depth {
                        frontier.push_children(normalize_links(&entry.url, &links), entry.depth);
                    }
                }
                Err(e) if e.is_page_level() => {
                    warn!("Page {} failed: {}", entry.url, e);
                    report.failed += 1;
                    lock(&self.storage)?.record_page_error(page_id, &e.to_string())?;
                }
                Err(e) => return Err(e),
            }
        };

        Ok(report)
    }

    /// Looks up the URL across all jobs and clears stale rows
    async fn check_freshness(&self, job_id: Uuid, url: &str) -> Result<Freshness> {
        let recent = lock(&self.storage)?.find_most_recent_page(url)?;

        if let Some(page) = &recent {
            if page.is_fresh(Utc::now(), self.settings.page_expiry) {
                return Ok(Freshness::Fresh);
            }
        }

        let own = lock(&self.storage)?.find_page(job_id, url)?;
        if let Some(own) = own {
            debug!("Clearing stale row {} for {}", own.id, url);
            purge_page(&self.storage, self.blobs.as_ref(), self.index.as_ref(), &own).await?;
        }

        if self.settings.stale_scope == StaleScope::Global {
            if let Some(page) = recent.filter(|p| p.job_id != Some(job_id)) {
                debug!("Clearing stale row {} of another job for {}", page.id, url);
                purge_page(&self.storage, self.blobs.as_ref(), self.index.as_ref(), &page).await?;
            }
        }

        Ok(Freshness::Crawl)
    }

    /// Fetches, stores and indexes one page; returns its raw outbound links
    async fn crawl_page(
        &self,
        session: &mut dyn FetchSession,
        page_id: i64,
        entry: &FrontierEntry,
    ) -> Result<Vec<String>> {
        let page = session.fetch(&entry.url).await?;
        let crawled_at = Utc::now();

        let storage_key = self.blobs.store(page_id, &page.html).await?;

        let document = IndexDocument {
            url: entry.url.clone(),
            title: page.title.unwrap_or_default(),
            content: page.plain_text,
            page_id,
            crawled_at,
        };
        let search_key = match self.index.index(document).await {
            Ok(key) => key,
            Err(e) => {
                if let Err(cleanup) = self.blobs.delete(&storage_key).await {
                    warn!("Could not remove blob {}: {}", storage_key, cleanup);
                }
                return Err(e.into());
            }
        };

        lock(&self.storage)?.record_page_success(
            page_id,
            &PageCrawl {
                crawled_at,
                http_status: page.http_status,
                storage_key_raw: storage_key,
                search_index_key: search_key,
            },
        )?;

        Ok(page.links)
    }
}
