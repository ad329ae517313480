use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Which stale page rows the engine may delete before a re-crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StaleScope {
    /// Only the current job's own row for the URL
    #[default]
    Job,
    /// Also the most recent row for the URL, whichever job owns it
    Global,
}

/// Crawl engine and admission behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Wall-clock budget of a job, measured from its submission (seconds)
    #[serde(rename = "sla-duration-secs")]
    pub sla_duration_secs: u64,

    /// Age after which a crawled URL may be fetched again (hours)
    #[serde(rename = "page-expiry-hours")]
    pub page_expiry_hours: u64,

    /// Depth limit applied when a submission omits it
    #[serde(rename = "default-max-depth")]
    pub default_max_depth: u32,

    /// Page budget applied when a submission omits it
    #[serde(rename = "default-max-pages")]
    pub default_max_pages: u32,

    #[serde(rename = "stale-scope")]
    pub stale_scope: StaleScope,
}

impl CrawlerConfig {
    pub fn sla_duration(&self) -> Duration {
        Duration::from_secs(self.sla_duration_secs)
    }

    pub fn page_expiry(&self) -> Duration {
        Duration::from_secs(self.page_expiry_hours.saturating_mul(3600))
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            sla_duration_secs: 3600,
            page_expiry_hours: 24,
            default_max_depth: 2,
            default_max_pages: 100,
            stale_scope: StaleScope::Job,
        }
    }
}

/// HTTP fetch backend configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Whole-request timeout (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    #[serde(rename = "connect-timeout-secs")]
    pub connect_timeout_secs: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("sla-crawler/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 15,
            connect_timeout_secs: 10,
        }
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of jobs processed in parallel
    pub count: usize,

    /// Deliveries of one task before giving up
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    #[serde(rename = "retry-backoff-ms")]
    pub retry_backoff_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: 4,
            max_attempts: 3,
            retry_backoff_ms: 1000,
        }
    }
}

/// Locations of the record store, blob store and search index
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(rename = "database-path")]
    pub database_path: String,

    #[serde(rename = "blob-dir")]
    pub blob_dir: String,

    #[serde(rename = "index-path")]
    pub index_path: String,
}

/// Retention sweep configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    #[serde(rename = "max-age-days")]
    pub max_age_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { max_age_days: 30 }
    }
}
