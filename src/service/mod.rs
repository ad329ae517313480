//! Request surface: submit, status, search and page details
//!
//! A thin layer that validates caller input, then delegates to the
//! dispatcher, the record store, the blob store and the search index.

use crate::admission::CrawlRequest;
use crate::blob::BlobStore;
use crate::dispatch::JobDispatcher;
use crate::index::{SearchIndex, SearchResults};
use crate::state::JobStatus;
use crate::storage::{lock, JobRecord, SharedStorage, Storage};
use crate::{CrawlerError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Default number of search hits per page
pub const DEFAULT_SEARCH_SIZE: i64 = 10;

/// Largest accepted search page
pub const MAX_SEARCH_SIZE: i64 = 100;

/// Public view of a job
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub url: String,
    /// Pages of this job with a successful fetch
    pub pages_crawled: u64,
    pub created_at: DateTime<Utc>,
}

impl JobStatusView {
    fn from_record(job: JobRecord, pages_crawled: u64) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            url: job.url,
            pages_crawled,
            created_at: job.requested_at,
        }
    }
}

/// Public view of a crawled page, with its stored content
#[derive(Debug, Clone, Serialize)]
pub struct PageDetails {
    pub id: i64,
    pub url: String,
    pub content: Option<String>,
    pub crawled_at: Option<DateTime<Utc>>,
    pub http_status: Option<u16>,
    pub storage_key: Option<String>,
    pub search_index_key: Option<String>,
    pub error: Option<String>,
}

/// Validated search parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub query: String,
    pub size: usize,
    pub offset: usize,
}

impl SearchQuery {
    /// Checks caller input: non-empty query, size in 1..=100, offset >= 0
    pub fn parse(query: &str, size: Option<i64>, offset: Option<i64>) -> Result<Self> {
        let query = query.trim();
        if query.is_empty() {
            return Err(CrawlerError::Validation("query must not be empty".to_string()));
        }

        let size = size.unwrap_or(DEFAULT_SEARCH_SIZE);
        if !(1..=MAX_SEARCH_SIZE).contains(&size) {
            return Err(CrawlerError::Validation(format!(
                "size must be between 1 and {}, got {}",
                MAX_SEARCH_SIZE, size
            )));
        }

        let offset = offset.unwrap_or(0);
        let offset = usize::try_from(offset).map_err(|_| {
            CrawlerError::Validation(format!("from must be non-negative, got {}", offset))
        })?;

        Ok(Self {
            query: query.to_string(),
            size: size as usize,
            offset,
        })
    }
}

/// Entry point for callers of the crawl system
pub struct CrawlService {
    dispatcher: JobDispatcher,
    storage: SharedStorage,
    blobs: Arc<dyn BlobStore>,
    index: Arc<dyn SearchIndex>,
}

impl CrawlService {
    pub fn new(
        dispatcher: JobDispatcher,
        storage: SharedStorage,
        blobs: Arc<dyn BlobStore>,
        index: Arc<dyn SearchIndex>,
    ) -> Self {
        Self {
            dispatcher,
            storage,
            blobs,
            index,
        }
    }

    /// Submits a crawl; the job runs asynchronously
    pub fn submit_crawl(&self, request: &CrawlRequest) -> Result<JobStatusView> {
        let job = self.dispatcher.submit(request)?;
        Ok(JobStatusView {
            job_id: job.job_id,
            status: job.status,
            url: job.url,
            pages_crawled: 0,
            created_at: job.requested_at,
        })
    }

    /// Looks up a job by its id string
    pub fn job_status(&self, job_id: &str) -> Result<JobStatusView> {
        let id = Uuid::parse_str(job_id.trim())
            .map_err(|_| CrawlerError::Validation(format!("invalid job id '{}'", job_id)))?;

        let storage = lock(&self.storage)?;
        let job = storage.get_job(id)?.ok_or_else(|| CrawlerError::NotFound {
            kind: "job",
            id: id.to_string(),
        })?;
        let pages_crawled = storage.count_crawled_pages(id)?;

        Ok(JobStatusView::from_record(job, pages_crawled))
    }

    /// Runs a full-text search over every crawled page
    pub async fn search(
        &self,
        query: &str,
        size: Option<i64>,
        offset: Option<i64>,
    ) -> Result<SearchResults> {
        let query = SearchQuery::parse(query, size, offset)?;
        let results = self
            .index
            .search(&query.query, query.size, query.offset)
            .await?;
        Ok(results)
    }

    /// Returns a page row together with its stored content
    pub async fn page_details(&self, page_id: i64) -> Result<PageDetails> {
        let page = lock(&self.storage)?.get_page(page_id)?;
        let page = page.ok_or_else(|| CrawlerError::NotFound {
            kind: "page",
            id: page_id.to_string(),
        })?;

        let content = match &page.storage_key_raw {
            Some(key) => self.blobs.retrieve(key).await?,
            None => None,
        };

        Ok(PageDetails {
            id: page.id,
            url: page.url,
            content,
            crawled_at: page.last_crawled_at,
            http_status: page.http_status,
            storage_key: page.storage_key_raw,
            search_index_key: page.search_index_key,
            error: page.error,
        })
    }
}
