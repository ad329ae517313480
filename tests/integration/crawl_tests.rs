//! Integration tests for the crawler
//!
//! Most tests drive the crawl engine with a scripted in-process fetcher so
//! traversal order, limits and failures are deterministic. The last group
//! uses wiremock to run the reqwest-backed fetcher end-to-end.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sla_crawler::admission::{AdmissionController, CrawlRequest, JobDescriptor};
use sla_crawler::blob::{BlobStore, FsBlobStore};
use sla_crawler::config::{CrawlerConfig, FetcherConfig, StaleScope};
use sla_crawler::crawler::{
    CrawlEngine, CrawlReport, EngineSettings, FetchError, FetchSession, FetchedPage, Fetcher,
    HttpFetcher, StopReason,
};
use sla_crawler::dispatch::{CrawlTask, JobDispatcher, RetryPolicy, TaskQueue, WorkerPool};
use sla_crawler::index::{
    document_id, IndexDocument, IndexError, IndexResult, SearchIndex, SearchResults,
    SqliteSearchIndex,
};
use sla_crawler::service::CrawlService;
use sla_crawler::storage::{
    lock, shared, NewJob, PageCrawl, PageRecord, SharedStorage, SqliteStorage, Storage,
};
use sla_crawler::{CrawlerError, JobStatus};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ROOT: &str = "https://example.com";
const HOUR: Duration = Duration::from_secs(3600);

fn url(path: &str) -> String {
    format!("{}{}", ROOT, path)
}

// ===== Scripted fetcher =====

#[derive(Default)]
struct Script {
    links: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    fatal: HashSet<String>,
    endless: bool,
    delay: Option<Duration>,
    calls: Vec<String>,
    sessions_opened: usize,
    sessions_closed: usize,
}

/// Fetcher whose pages, links and failures are set up by the test
#[derive(Clone, Default)]
struct ScriptedFetcher(Arc<Mutex<Script>>);

impl ScriptedFetcher {
    fn with_links(self, page: &str, links: &[&str]) -> Self {
        self.0
            .lock()
            .unwrap()
            .links
            .insert(page.to_string(), links.iter().map(|l| l.to_string()).collect());
        self
    }

    fn failing(self, page: &str) -> Self {
        self.0.lock().unwrap().failing.insert(page.to_string());
        self
    }

    fn fatal(self, page: &str) -> Self {
        self.0.lock().unwrap().fatal.insert(page.to_string());
        self
    }

    /// Every page links to two new pages below it
    fn endless(self, delay: Duration) -> Self {
        {
            let mut script = self.0.lock().unwrap();
            script.endless = true;
            script.delay = Some(delay);
        }
        self
    }

    fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().calls.clone()
    }

    fn sessions(&self) -> (usize, usize) {
        let script = self.0.lock().unwrap();
        (script.sessions_opened, script.sessions_closed)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn open_session(&self) -> Result<Box<dyn FetchSession>, FetchError> {
        self.0.lock().unwrap().sessions_opened += 1;
        Ok(Box::new(ScriptedSession(self.0.clone())))
    }
}

struct ScriptedSession(Arc<Mutex<Script>>);

#[async_trait]
impl FetchSession for ScriptedSession {
    async fn fetch(&mut self, url: &str) -> Result<FetchedPage, FetchError> {
        let delay = {
            let mut script = self.0.lock().unwrap();
            script.calls.push(url.to_string());
            script.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let script = self.0.lock().unwrap();
        if script.fatal.contains(url) {
            return Err(FetchError::SessionUnavailable("browser crashed".to_string()));
        }
        if script.failing.contains(url) {
            return Err(FetchError::Timeout(format!("navigation timeout: {}", url)));
        }

        let links = if script.endless {
            vec![format!("{}/x", url), format!("{}/y", url)]
        } else {
            script.links.get(url).cloned().unwrap_or_default()
        };

        Ok(FetchedPage {
            html: format!("<html><body>page {}</body></html>", url),
            plain_text: format!("page {}", url),
            title: Some(url.to_string()),
            links,
            http_status: 200,
        })
    }

    async fn close(self: Box<Self>) {
        self.0.lock().unwrap().sessions_closed += 1;
    }
}

/// Search index that refuses documents whose URL contains "broken"
struct FlakyIndex(SqliteSearchIndex);

#[async_trait]
impl SearchIndex for FlakyIndex {
    async fn index(&self, doc: IndexDocument) -> IndexResult<String> {
        if doc.url.contains("broken") {
            return Err(IndexError::Backend(rusqlite::Error::InvalidQuery));
        }
        self.0.index(doc).await
    }

    async fn delete(&self, doc_id: &str) -> IndexResult<()> {
        self.0.delete(doc_id).await
    }

    async fn search(&self, query: &str, size: usize, offset: usize) -> IndexResult<SearchResults> {
        self.0.search(query, size, offset).await
    }

    async fn refresh(&self) -> IndexResult<()> {
        self.0.refresh().await
    }
}

/// Queue that drops every task; for tests that only read
struct NullQueue;

impl TaskQueue for NullQueue {
    fn enqueue(&self, _task: CrawlTask) -> Result<(), sla_crawler::dispatch::DispatchError> {
        Ok(())
    }
}

// ===== Harness =====

struct Harness {
    dir: TempDir,
    storage: SharedStorage,
    blobs: Arc<FsBlobStore>,
    index: Arc<dyn SearchIndex>,
}

impl Harness {
    fn new() -> Self {
        Self::with_index(Arc::new(SqliteSearchIndex::open_in_memory().unwrap()))
    }

    fn with_index(index: Arc<dyn SearchIndex>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self {
            storage: shared(SqliteStorage::open_in_memory().unwrap()),
            blobs: Arc::new(FsBlobStore::new(dir.path())),
            index,
            dir,
        }
    }

    /// Record store in a file, so a second connection can alter it
    fn on_disk() -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self {
            storage: shared(SqliteStorage::new(&dir.path().join("crawl.db")).unwrap()),
            blobs: Arc::new(FsBlobStore::new(dir.path().join("blobs"))),
            index: Arc::new(SqliteSearchIndex::open_in_memory().unwrap()),
            dir,
        }
    }

    /// Makes the next `times` terminal status writes silently do nothing
    fn refuse_job_finish(&self, times: u32) {
        let conn = rusqlite::Connection::open(self.dir.path().join("crawl.db")).unwrap();
        conn.execute_batch(&format!(
            "CREATE TABLE refusals (remaining INTEGER NOT NULL);
             INSERT INTO refusals VALUES ({});
             CREATE TRIGGER refuse_job_finish BEFORE UPDATE OF status ON jobs
             WHEN NEW.status IN ('completed', 'failed')
                 AND (SELECT remaining FROM refusals) > 0
             BEGIN
                 UPDATE refusals SET remaining = remaining - 1;
                 SELECT RAISE(IGNORE);
             END;",
            times
        ))
        .unwrap();
    }

    fn engine(&self, fetcher: Arc<dyn Fetcher>, stale_scope: StaleScope) -> CrawlEngine {
        CrawlEngine::new(
            self.storage.clone(),
            fetcher,
            self.blobs.clone(),
            self.index.clone(),
            EngineSettings {
                page_expiry: Duration::from_secs(24 * 3600),
                stale_scope,
            },
        )
    }

    fn admission(&self) -> AdmissionController {
        AdmissionController::new(self.storage.clone(), &CrawlerConfig::default())
    }

    fn admit(&self, root: &str, max_depth: i64, max_pages: i64) -> JobDescriptor {
        self.admission()
            .admit(
                &CrawlRequest::new(root)
                    .with_max_depth(max_depth)
                    .with_max_pages(max_pages),
            )
            .unwrap()
    }

    fn pages(&self, job_id: Uuid) -> Vec<PageRecord> {
        lock(&self.storage).unwrap().pages_for_job(job_id).unwrap()
    }

    fn page(&self, job_id: Uuid, page_url: &str) -> Option<PageRecord> {
        lock(&self.storage).unwrap().find_page(job_id, page_url).unwrap()
    }

    fn job_status(&self, job_id: Uuid) -> JobStatus {
        lock(&self.storage)
            .unwrap()
            .get_job(job_id)
            .unwrap()
            .unwrap()
            .status
    }

    /// Creates a page row owned by a fresh job, crawled at `crawled_at`
    fn seed_crawled(&self, page_url: &str, crawled_at: DateTime<Utc>) -> (Uuid, i64) {
        let mut storage = lock(&self.storage).unwrap();
        let job = storage
            .create_job(&NewJob {
                url: page_url.to_string(),
                max_depth: 1,
                max_pages: 1,
                requested_at: Utc::now(),
            })
            .unwrap();
        let page_id = storage.create_page(job.id, page_url).unwrap();
        storage
            .record_page_success(
                page_id,
                &PageCrawl {
                    crawled_at,
                    http_status: 200,
                    storage_key_raw: "crawls/0/seeded.html".to_string(),
                    search_index_key: document_id(page_url),
                },
            )
            .unwrap();
        (job.id, page_id)
    }
}

async fn run(
    engine: &CrawlEngine,
    job: &JobDescriptor,
    sla: Duration,
) -> Result<CrawlReport, CrawlerError> {
    engine.run(&CrawlTask::for_job(job, sla)).await
}

fn urls(pages: &[PageRecord]) -> HashSet<String> {
    pages.iter().map(|p| p.url.clone()).collect()
}

// ===== Scenarios =====

#[tokio::test]
async fn test_depth_one_crawl_creates_root_and_children() {
    let h = Harness::new();
    let fetcher = ScriptedFetcher::default()
        .with_links(
            ROOT,
            &["/a", "/b/", "c", "mailto:someone@example.com", "https://other.com/x"],
        )
        .with_links(&url("/a"), &["/deeper"]);
    let engine = h.engine(Arc::new(fetcher.clone()), StaleScope::Job);

    let job = h.admit(ROOT, 1, 5);
    let report = run(&engine, &job, HOUR).await.unwrap();

    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.stop_reason, StopReason::FrontierExhausted);

    let pages = h.pages(job.job_id);
    assert_eq!(pages.len(), 4);
    assert_eq!(
        urls(&pages),
        [ROOT.to_string(), url("/a"), url("/b"), url("/c")]
            .into_iter()
            .collect()
    );
    assert!(h.page(job.job_id, &url("/deeper")).is_none());
    assert_eq!(fetcher.calls().len(), 4);

    let record = lock(&h.storage).unwrap().get_job(job.job_id).unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert!(record.started_at.is_some());
    assert!(record.finished_at.is_some());
}

#[tokio::test]
async fn test_child_failure_is_isolated() {
    let h = Harness::new();
    let fetcher = ScriptedFetcher::default()
        .with_links(ROOT, &["/a", "/b", "/c"])
        .failing(&url("/b"));
    let engine = h.engine(Arc::new(fetcher.clone()), StaleScope::Job);

    let job = h.admit(ROOT, 1, 10);
    let report = run(&engine, &job, HOUR).await.unwrap();

    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.fetched, 3);
    assert_eq!(report.failed, 1);

    let failed = h.page(job.job_id, &url("/b")).unwrap();
    assert!(failed.error.as_deref().unwrap().contains("navigation timeout"));
    assert!(failed.last_crawled_at.is_none());
    assert!(failed.storage_key_raw.is_none());

    for sibling in ["/a", "/c"] {
        let page = h.page(job.job_id, &url(sibling)).unwrap();
        assert!(page.last_crawled_at.is_some());
        assert!(page.error.is_none());
    }
}

#[tokio::test]
async fn test_fresh_root_is_not_fetched_again() {
    let h = Harness::new();
    h.seed_crawled(ROOT, Utc::now());
    let fetcher = ScriptedFetcher::default().with_links(ROOT, &["/a"]);
    let engine = h.engine(Arc::new(fetcher.clone()), StaleScope::Job);

    let job = h.admit(ROOT, 2, 10);
    let report = run(&engine, &job, HOUR).await.unwrap();

    assert!(fetcher.calls().is_empty());
    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.attempted, 0);
    assert!(h.pages(job.job_id).is_empty());
}

#[tokio::test]
async fn test_admission_rejected_while_old_job_is_queued() {
    let h = Harness::new();
    lock(&h.storage)
        .unwrap()
        .create_job(&NewJob {
            url: ROOT.to_string(),
            max_depth: 1,
            max_pages: 1,
            requested_at: Utc::now() - chrono::Duration::hours(2),
        })
        .unwrap();

    let result = h.admission().admit(&CrawlRequest::new("https://example.org"));

    match result {
        Err(e @ CrawlerError::AdmissionRejected(_)) => {
            assert!(e.is_retryable());
            assert!(e.to_string().contains("try later"));
        }
        other => panic!("expected admission rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_search_validation_and_pagination() {
    let h = Harness::new();
    for i in 0..15 {
        h.index
            .index(IndexDocument {
                url: url(&format!("/doc{}", i)),
                title: format!("Doc {}", i),
                content: "shared gadget text".to_string(),
                page_id: i,
                crawled_at: Utc::now(),
            })
            .await
            .unwrap();
    }
    h.index.refresh().await.unwrap();

    let service = CrawlService::new(
        JobDispatcher::new(h.admission(), Arc::new(NullQueue)),
        h.storage.clone(),
        h.blobs.clone(),
        h.index.clone(),
    );

    for size in [0, 101] {
        assert!(matches!(
            service.search("gadget", Some(size), Some(0)).await,
            Err(CrawlerError::Validation(_))
        ));
    }
    assert!(matches!(
        service.search("   ", None, None).await,
        Err(CrawlerError::Validation(_))
    ));

    let results = service.search("gadget", Some(10), Some(0)).await.unwrap();
    assert_eq!(results.total, 15);
    assert_eq!(results.hits.len(), 10);
}

// ===== Traversal properties =====

#[tokio::test]
async fn test_traversal_is_breadth_first() {
    let h = Harness::new();
    let fetcher = ScriptedFetcher::default()
        .with_links(ROOT, &["/a", "/b"])
        .with_links(&url("/a"), &["/a/1"])
        .with_links(&url("/b"), &["/b/1"]);
    let engine = h.engine(Arc::new(fetcher.clone()), StaleScope::Job);

    let job = h.admit(ROOT, 2, 10);
    run(&engine, &job, HOUR).await.unwrap();

    assert_eq!(
        fetcher.calls(),
        vec![
            ROOT.to_string(),
            url("/a"),
            url("/b"),
            url("/a/1"),
            url("/b/1")
        ]
    );
}

#[tokio::test]
async fn test_root_with_trailing_slash_is_fetched_once() {
    let h = Harness::new();
    let fetcher = ScriptedFetcher::default().with_links(ROOT, &["/", "https://example.com/"]);
    let engine = h.engine(Arc::new(fetcher.clone()), StaleScope::Job);

    let job = h.admit("https://example.com/", 2, 10);
    let report = run(&engine, &job, HOUR).await.unwrap();

    assert_eq!(fetcher.calls(), vec![ROOT.to_string()]);
    assert_eq!(h.pages(job.job_id).len(), 1);
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn test_page_budget_caps_attempts() {
    let h = Harness::new();
    let children: Vec<String> = (0..10).map(|i| format!("/p{}", i)).collect();
    let children: Vec<&str> = children.iter().map(String::as_str).collect();
    let fetcher = ScriptedFetcher::default().with_links(ROOT, &children);
    let engine = h.engine(Arc::new(fetcher.clone()), StaleScope::Job);

    let job = h.admit(ROOT, 3, 3);
    let report = run(&engine, &job, HOUR).await.unwrap();

    assert_eq!(fetcher.calls().len(), 3);
    assert_eq!(h.pages(job.job_id).len(), 3);
    assert_eq!(report.attempted, 3);
    assert_eq!(report.stop_reason, StopReason::PageBudget);
    assert_eq!(report.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_failed_page_is_attempted_once_per_run() {
    let h = Harness::new();
    let fetcher = ScriptedFetcher::default()
        .with_links(ROOT, &["/a", "/b"])
        .with_links(&url("/a"), &["/b"])
        .failing(&url("/b"));
    let engine = h.engine(Arc::new(fetcher.clone()), StaleScope::Job);

    let job = h.admit(ROOT, 2, 10);
    let report = run(&engine, &job, HOUR).await.unwrap();

    let b_calls = fetcher.calls().iter().filter(|c| **c == url("/b")).count();
    assert_eq!(b_calls, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn test_expired_deadline_stops_before_first_fetch() {
    let h = Harness::new();
    let fetcher = ScriptedFetcher::default().with_links(ROOT, &["/a"]);
    let engine = h.engine(Arc::new(fetcher.clone()), StaleScope::Job);

    let job = h.admit(ROOT, 2, 10);
    let report = run(&engine, &job, Duration::ZERO).await.unwrap();

    assert!(fetcher.calls().is_empty());
    assert_eq!(report.stop_reason, StopReason::Deadline);
    assert_eq!(h.job_status(job.job_id), JobStatus::Completed);
}

#[tokio::test]
async fn test_deadline_bounds_an_endless_frontier() {
    let h = Harness::new();
    let fetcher = ScriptedFetcher::default().endless(Duration::from_millis(100));
    let engine = h.engine(Arc::new(fetcher.clone()), StaleScope::Job);

    let job = h.admit(ROOT, 50, 1000);
    let report = run(&engine, &job, Duration::from_millis(350)).await.unwrap();

    let calls = fetcher.calls().len();
    assert!(calls >= 1, "expected some progress, got {}", calls);
    assert!(calls <= 5, "deadline not honoured: {} fetches", calls);
    assert_eq!(report.stop_reason, StopReason::Deadline);
    assert_eq!(report.status, JobStatus::Completed);
}

// ===== Lifecycle and resumability =====

#[tokio::test]
async fn test_redelivered_running_job_skips_fresh_pages() {
    let h = Harness::new();
    let fetcher = ScriptedFetcher::default().with_links(ROOT, &["/a"]);
    let engine = h.engine(Arc::new(fetcher.clone()), StaleScope::Job);

    let job = h.admit(ROOT, 1, 1);
    // First delivery crashed after crawling the root
    {
        let mut storage = lock(&h.storage).unwrap();
        storage.mark_job_running(job.job_id, Utc::now()).unwrap();
        let page_id = storage.create_page(job.job_id, ROOT).unwrap();
        storage
            .record_page_success(
                page_id,
                &PageCrawl {
                    crawled_at: Utc::now(),
                    http_status: 200,
                    storage_key_raw: "crawls/1/first.html".to_string(),
                    search_index_key: document_id(ROOT),
                },
            )
            .unwrap();
    }

    let report = run(&engine, &job, HOUR).await.unwrap();

    assert!(fetcher.calls().is_empty());
    assert_eq!(report.attempted, 0);
    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(h.pages(job.job_id).len(), 1);
}

#[tokio::test]
async fn test_terminal_job_is_not_rerun() {
    let h = Harness::new();
    let fetcher = ScriptedFetcher::default();
    let engine = h.engine(Arc::new(fetcher.clone()), StaleScope::Job);

    let job = h.admit(ROOT, 1, 1);
    run(&engine, &job, HOUR).await.unwrap();
    let report = run(&engine, &job, HOUR).await.unwrap();

    assert_eq!(report.stop_reason, StopReason::AlreadyTerminal);
    assert_eq!(fetcher.calls().len(), 1);
}

#[tokio::test]
async fn test_fatal_fetch_error_fails_job_and_releases_session() {
    let h = Harness::new();
    let fetcher = ScriptedFetcher::default()
        .with_links(ROOT, &["/a"])
        .fatal(&url("/a"));
    let engine = h.engine(Arc::new(fetcher.clone()), StaleScope::Job);

    let job = h.admit(ROOT, 1, 10);
    let result = run(&engine, &job, HOUR).await;

    assert!(matches!(
        result,
        Err(CrawlerError::Fetch(FetchError::SessionUnavailable(_)))
    ));
    let record = lock(&h.storage).unwrap().get_job(job.job_id).unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert!(record.finished_at.is_some());
    assert_eq!(fetcher.sessions(), (1, 1));
}

#[tokio::test]
async fn test_session_is_closed_after_success() {
    let h = Harness::new();
    let fetcher = ScriptedFetcher::default().with_links(ROOT, &["/a"]);
    let engine = h.engine(Arc::new(fetcher.clone()), StaleScope::Job);

    let job = h.admit(ROOT, 1, 10);
    run(&engine, &job, HOUR).await.unwrap();

    assert_eq!(fetcher.sessions(), (1, 1));
}

#[tokio::test]
async fn test_index_failure_is_page_level_and_drops_blob() {
    let h = Harness::with_index(Arc::new(FlakyIndex(
        SqliteSearchIndex::open_in_memory().unwrap(),
    )));
    let fetcher = ScriptedFetcher::default().with_links(ROOT, &["/ok", "/broken"]);
    let engine = h.engine(Arc::new(fetcher.clone()), StaleScope::Job);

    let job = h.admit(ROOT, 1, 10);
    let report = run(&engine, &job, HOUR).await.unwrap();
    assert_eq!(report.status, JobStatus::Completed);

    let broken = h.page(job.job_id, &url("/broken")).unwrap();
    assert!(broken.error.is_some());
    assert!(broken.last_crawled_at.is_none());

    let blob_dir = h.dir.path().join(format!("crawls/{}", broken.id));
    let leftover = std::fs::read_dir(&blob_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftover, 0);

    let ok = h.page(job.job_id, &url("/ok")).unwrap();
    let key = ok.storage_key_raw.unwrap();
    assert!(h.blobs.retrieve(&key).await.unwrap().is_some());
}

#[tokio::test]
async fn test_crawled_rows_never_carry_errors() {
    let h = Harness::new();
    let fetcher = ScriptedFetcher::default()
        .with_links(ROOT, &["/a", "/b", "/c"])
        .failing(&url("/c"));
    let engine = h.engine(Arc::new(fetcher), StaleScope::Job);

    let job = h.admit(ROOT, 1, 10);
    run(&engine, &job, HOUR).await.unwrap();

    for page in h.pages(job.job_id) {
        if page.last_crawled_at.is_some() {
            assert!(page.error.is_none(), "{} has both", page.url);
        }
    }
}

// ===== Stale-row scope =====

#[tokio::test]
async fn test_job_scope_keeps_other_jobs_stale_rows() {
    let h = Harness::new();
    let (_, stale_page) = h.seed_crawled(ROOT, Utc::now() - chrono::Duration::hours(30));
    let fetcher = ScriptedFetcher::default();
    let engine = h.engine(Arc::new(fetcher.clone()), StaleScope::Job);

    let job = h.admit(ROOT, 1, 10);
    run(&engine, &job, HOUR).await.unwrap();

    assert_eq!(fetcher.calls(), vec![ROOT.to_string()]);
    assert!(lock(&h.storage).unwrap().get_page(stale_page).unwrap().is_some());
    assert!(h.page(job.job_id, ROOT).unwrap().last_crawled_at.is_some());
}

#[tokio::test]
async fn test_global_scope_deletes_other_jobs_stale_rows() {
    let h = Harness::new();
    let (_, stale_page) = h.seed_crawled(ROOT, Utc::now() - chrono::Duration::hours(30));
    let fetcher = ScriptedFetcher::default();
    let engine = h.engine(Arc::new(fetcher.clone()), StaleScope::Global);

    let job = h.admit(ROOT, 1, 10);
    run(&engine, &job, HOUR).await.unwrap();

    assert_eq!(fetcher.calls(), vec![ROOT.to_string()]);
    assert!(lock(&h.storage).unwrap().get_page(stale_page).unwrap().is_none());
    assert!(h.page(job.job_id, ROOT).is_some());
}

#[tokio::test]
async fn test_previous_failure_is_retried_by_next_job() {
    let h = Harness::new();
    let first = ScriptedFetcher::default().failing(ROOT);
    let engine = h.engine(Arc::new(first), StaleScope::Job);
    let job_a = h.admit(ROOT, 1, 10);
    run(&engine, &job_a, HOUR).await.unwrap();

    let second = ScriptedFetcher::default();
    let engine = h.engine(Arc::new(second.clone()), StaleScope::Job);
    let job_b = h.admit(ROOT, 1, 10);
    run(&engine, &job_b, HOUR).await.unwrap();

    assert_eq!(second.calls(), vec![ROOT.to_string()]);
    assert!(h.page(job_b.job_id, ROOT).unwrap().last_crawled_at.is_some());
}

// ===== Worker pool =====

#[tokio::test]
async fn test_worker_pool_runs_dispatched_jobs() {
    let h = Harness::new();
    let fetcher = ScriptedFetcher::default()
        .with_links(ROOT, &["/a"])
        .with_links("https://example.org", &["/b"]);
    let engine = Arc::new(h.engine(Arc::new(fetcher.clone()), StaleScope::Job));
    let pool = Arc::new(WorkerPool::start(
        2,
        engine,
        h.storage.clone(),
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(10),
        },
    ));
    let dispatcher = JobDispatcher::new(h.admission(), pool.clone());

    let a = dispatcher.submit(&CrawlRequest::new(ROOT).with_max_depth(1)).unwrap();
    let b = dispatcher
        .submit(&CrawlRequest::new("https://example.org").with_max_depth(1))
        .unwrap();
    pool.shutdown().await.unwrap();

    assert_eq!(h.job_status(a.job_id), JobStatus::Completed);
    assert_eq!(h.job_status(b.job_id), JobStatus::Completed);
    assert_eq!(fetcher.calls().len(), 4);
    assert!(pool
        .enqueue(CrawlTask::for_job(&a, HOUR))
        .is_err());
}

#[tokio::test]
async fn test_failed_job_is_not_redelivered() {
    let h = Harness::new();
    let fetcher = ScriptedFetcher::default().fatal(ROOT);
    let engine = Arc::new(h.engine(Arc::new(fetcher.clone()), StaleScope::Job));
    let pool = Arc::new(WorkerPool::start(
        1,
        engine,
        h.storage.clone(),
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(10),
        },
    ));
    let dispatcher = JobDispatcher::new(h.admission(), pool.clone());

    let job = dispatcher.submit(&CrawlRequest::new(ROOT)).unwrap();
    pool.shutdown().await.unwrap();

    assert_eq!(h.job_status(job.job_id), JobStatus::Failed);
    assert_eq!(fetcher.calls().len(), 1);
}

#[tokio::test]
async fn test_unrecorded_failure_is_redelivered() {
    let h = Harness::on_disk();
    h.refuse_job_finish(2);
    let fetcher = ScriptedFetcher::default().with_links(ROOT, &["/a"]);
    let engine = Arc::new(h.engine(Arc::new(fetcher.clone()), StaleScope::Job));
    let pool = Arc::new(WorkerPool::start(
        1,
        engine,
        h.storage.clone(),
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(5),
        },
    ));
    let dispatcher = JobDispatcher::new(h.admission(), pool.clone());

    let job = dispatcher
        .submit(&CrawlRequest::new(ROOT).with_max_depth(1))
        .unwrap();
    pool.shutdown().await.unwrap();

    // The second delivery resumes and finds every page still fresh
    assert_eq!(fetcher.sessions(), (2, 2));
    assert_eq!(fetcher.calls(), vec![ROOT.to_string(), url("/a")]);
    assert_eq!(h.job_status(job.job_id), JobStatus::Completed);
}

#[tokio::test]
async fn test_redelivery_stops_at_max_attempts() {
    let h = Harness::on_disk();
    h.refuse_job_finish(1000);
    let fetcher = ScriptedFetcher::default();
    let engine = Arc::new(h.engine(Arc::new(fetcher.clone()), StaleScope::Job));
    let pool = Arc::new(WorkerPool::start(
        1,
        engine,
        h.storage.clone(),
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(5),
        },
    ));
    let dispatcher = JobDispatcher::new(h.admission(), pool.clone());

    let job = dispatcher.submit(&CrawlRequest::new(ROOT)).unwrap();
    pool.shutdown().await.unwrap();

    assert_eq!(fetcher.sessions(), (3, 3));
    assert_eq!(fetcher.calls(), vec![ROOT.to_string()]);
    assert_eq!(h.job_status(job.job_id), JobStatus::Running);
}

// ===== HTTP fetcher end-to-end =====

fn html_response(status: u16, body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_raw(body.into(), "text/html")
}

#[tokio::test]
async fn test_http_crawl_end_to_end() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            html_response(
                200,
                format!(
                    r#"<html><head><title>Home</title></head><body>
                    <p>welcome to the crawler</p>
                    <a href="{}/page1">Page 1</a>
                    <a href="{}/page2/">Page 2</a>
                    <a href="https://elsewhere.example/">Elsewhere</a>
                    </body></html>"#,
                    base_url, base_url
                ),
            ),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page1"))
        .respond_with(
            html_response(
                200,
                "<html><head><title>One</title></head><body>ferris lives here</body></html>",
            ),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(html_response(500, "<html>oops</html>"))
        .mount(&mock_server)
        .await;

    let h = Harness::new();
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(FetcherConfig::default()));
    let engine = Arc::new(h.engine(fetcher, StaleScope::Job));
    let pool = Arc::new(WorkerPool::start(
        1,
        engine,
        h.storage.clone(),
        RetryPolicy {
            max_attempts: 1,
            backoff: Duration::from_millis(10),
        },
    ));
    let service = CrawlService::new(
        JobDispatcher::new(h.admission(), pool.clone()),
        h.storage.clone(),
        h.blobs.clone(),
        h.index.clone(),
    );

    let submitted = service
        .submit_crawl(&CrawlRequest::new(base_url.clone()).with_max_depth(1))
        .unwrap();
    pool.shutdown().await.unwrap();

    let status = service.job_status(&submitted.job_id.to_string()).unwrap();
    assert_eq!(status.status, JobStatus::Completed);
    assert_eq!(status.pages_crawled, 3);

    let page2 = h
        .page(submitted.job_id, &format!("{}/page2", base_url))
        .unwrap();
    assert_eq!(page2.http_status, Some(500));
    assert!(page2.error.is_none());

    let results = service.search("ferris", None, None).await.unwrap();
    assert_eq!(results.total, 1);
    assert_eq!(results.hits[0].url, format!("{}/page1", base_url));
    assert_eq!(results.hits[0].title, "One");

    let root = h.page(submitted.job_id, &base_url).unwrap();
    let details = service.page_details(root.id).await.unwrap();
    assert!(details.content.unwrap().contains("welcome to the crawler"));
    assert!(details.crawled_at.is_some());

    assert!(matches!(
        service.page_details(i64::MAX).await,
        Err(CrawlerError::NotFound { .. })
    ));
    assert!(matches!(
        service.job_status("not-a-uuid"),
        Err(CrawlerError::Validation(_))
    ));
    assert!(matches!(
        service.job_status(&Uuid::new_v4().to_string()),
        Err(CrawlerError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_unreachable_root_still_completes() {
    let h = Harness::new();
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(FetcherConfig {
        timeout_secs: 2,
        connect_timeout_secs: 1,
        ..FetcherConfig::default()
    }));
    let engine = h.engine(fetcher, StaleScope::Job);

    let job = h.admit("http://127.0.0.1:1", 1, 10);
    let report = run(&engine, &job, HOUR).await.unwrap();

    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.failed, 1);
    let root = h.page(job.job_id, "http://127.0.0.1:1").unwrap();
    assert!(root.error.is_some());
    assert!(root.last_crawled_at.is_none());
}

#[tokio::test]
async fn test_non_html_response_is_rejected_by_session() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(b"%PDF-1.4\x00\xff binary".to_vec(), "application/pdf"),
        )
        .mount(&mock_server)
        .await;

    let fetcher = HttpFetcher::new(FetcherConfig::default());
    let mut session = fetcher.open_session().await.unwrap();
    let result = session
        .fetch(&format!("{}/report.pdf", mock_server.uri()))
        .await;
    session.close().await;

    match result {
        Err(e @ FetchError::ContentMismatch(_)) => {
            assert!(e.to_string().contains("application/pdf"));
            assert!(!e.is_fatal());
        }
        other => panic!("expected a content mismatch, got {:?}", other),
    }
}

#[tokio::test]
async fn test_linked_pdf_is_recorded_as_page_failure() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response(
            200,
            format!(
                r#"<html><body><p>annual figures</p><a href="{}/report.pdf">Report</a></body></html>"#,
                base_url
            ),
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(b"%PDF-1.4 annual figures".to_vec(), "application/pdf"),
        )
        .mount(&mock_server)
        .await;

    let h = Harness::new();
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(FetcherConfig::default()));
    let engine = h.engine(fetcher, StaleScope::Job);

    let job = h.admit(&base_url, 1, 10);
    let report = run(&engine, &job, HOUR).await.unwrap();

    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.fetched, 1);
    assert_eq!(report.failed, 1);

    let pdf = h
        .page(job.job_id, &format!("{}/report.pdf", base_url))
        .unwrap();
    assert!(pdf.error.as_deref().unwrap().contains("application/pdf"));
    assert!(pdf.last_crawled_at.is_none());
    assert!(pdf.storage_key_raw.is_none());

    let results = h.index.search("annual", 10, 0).await.unwrap();
    assert_eq!(results.total, 1);
    assert_eq!(results.hits[0].url, base_url);
}
