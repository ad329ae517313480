//! SLA Crawler main entry point
//!
//! This is the command-line interface for submitting crawls and inspecting
//! the job, page and search stores.

use anyhow::Context;
use clap::{Parser, Subcommand};
use sla_crawler::admission::{AdmissionController, CrawlRequest};
use sla_crawler::blob::{BlobStore, FsBlobStore};
use sla_crawler::config::{load_config_with_hash, Config};
use sla_crawler::crawler::{CrawlEngine, EngineSettings, Fetcher, HttpFetcher};
use sla_crawler::dispatch::{JobDispatcher, RetryPolicy, TaskQueue, WorkerPool};
use sla_crawler::index::{SearchIndex, SqliteSearchIndex};
use sla_crawler::output::{load_statistics, print_statistics, to_pretty_json};
use sla_crawler::retention::sweep_expired_jobs;
use sla_crawler::service::CrawlService;
use sla_crawler::storage::{lock, shared, SharedStorage, SqliteStorage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// SLA Crawler: a deadline-bounded breadth-first site crawler
///
/// Crawls a root URL breadth-first within depth and page limits, stores raw
/// pages and feeds a full-text index. New jobs are refused while any job has
/// been waiting or running longer than the SLA.
#[derive(Parser, Debug)]
#[command(name = "sla-crawler")]
#[command(version)]
#[command(about = "A deadline-bounded breadth-first site crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a crawl and run it to completion
    Crawl {
        /// Root URL to crawl
        url: String,

        /// Maximum link depth from the root
        #[arg(long, allow_negative_numbers = true)]
        max_depth: Option<i64>,

        /// Maximum pages attempted
        #[arg(long, allow_negative_numbers = true)]
        max_pages: Option<i64>,
    },

    /// Show the status of a job
    Status {
        /// Job id
        job_id: String,
    },

    /// Show a page and its stored content
    Page {
        /// Page id
        page_id: i64,
    },

    /// Search crawled pages
    Search {
        /// Query text
        query: String,

        /// Number of hits to return (1-100)
        #[arg(long, allow_negative_numbers = true)]
        size: Option<i64>,

        /// Offset of the first hit
        #[arg(long, allow_negative_numbers = true)]
        from: Option<i64>,
    },

    /// Delete jobs older than the retention window
    Cleanup {
        /// Age in days; defaults to the configured retention
        #[arg(long)]
        days: Option<u32>,

        /// Report what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Show job and page statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let app = App::open(&config)?;

    let result = match cli.command {
        Command::Crawl {
            url,
            max_depth,
            max_pages,
        } => handle_crawl(&app, url, max_depth, max_pages).await,
        Command::Status { job_id } => print_json(&app.service.job_status(&job_id)?),
        Command::Page { page_id } => print_json(&app.service.page_details(page_id).await?),
        Command::Search { query, size, from } => {
            print_json(&app.service.search(&query, size, from).await?)
        }
        Command::Cleanup { days, dry_run } => handle_cleanup(&app, &config, days, dry_run).await,
        Command::Stats => handle_stats(&app),
    };

    app.pool.shutdown().await?;
    result
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sla_crawler=info,warn"),
            1 => EnvFilter::new("sla_crawler=debug,info"),
            2 => EnvFilter::new("sla_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Every collaborator, constructed once for the process
struct App {
    storage: SharedStorage,
    blobs: Arc<dyn BlobStore>,
    index: Arc<dyn SearchIndex>,
    pool: Arc<WorkerPool>,
    service: CrawlService,
}

impl App {
    fn open(config: &Config) -> anyhow::Result<Self> {
        let storage = shared(
            SqliteStorage::new(Path::new(&config.storage.database_path))
                .context("failed to open job database")?,
        );
        let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(&config.storage.blob_dir));
        let index: Arc<dyn SearchIndex> = Arc::new(
            SqliteSearchIndex::open(Path::new(&config.storage.index_path))
                .context("failed to open search index")?,
        );
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(config.fetcher.clone()));

        let engine = Arc::new(CrawlEngine::new(
            storage.clone(),
            fetcher,
            blobs.clone(),
            index.clone(),
            EngineSettings::from(&config.crawler),
        ));
        let pool = Arc::new(WorkerPool::start(
            config.workers.count,
            engine,
            storage.clone(),
            RetryPolicy::from(&config.workers),
        ));

        let queue: Arc<dyn TaskQueue> = pool.clone();
        let dispatcher = JobDispatcher::new(
            AdmissionController::new(storage.clone(), &config.crawler),
            queue,
        );
        let service = CrawlService::new(dispatcher, storage.clone(), blobs.clone(), index.clone());

        Ok(Self {
            storage,
            blobs,
            index,
            pool,
            service,
        })
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", to_pretty_json(value)?);
    Ok(())
}

/// Handles the crawl command: submits the job and waits for the workers
async fn handle_crawl(
    app: &App,
    url: String,
    max_depth: Option<i64>,
    max_pages: Option<i64>,
) -> anyhow::Result<()> {
    let request = CrawlRequest {
        url,
        max_depth,
        max_pages,
    };

    let submitted = app.service.submit_crawl(&request)?;
    tracing::info!("Submitted job {}", submitted.job_id);

    // Drain the queue so the job reaches a terminal state before we report
    app.pool.shutdown().await?;

    print_json(&app.service.job_status(&submitted.job_id.to_string())?)
}

/// Handles the cleanup command: runs the retention sweep
async fn handle_cleanup(
    app: &App,
    config: &Config,
    days: Option<u32>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let days = days.unwrap_or(config.retention.max_age_days);
    let max_age = Duration::from_secs(u64::from(days) * 24 * 3600);

    let report = sweep_expired_jobs(
        &app.storage,
        app.blobs.as_ref(),
        app.index.as_ref(),
        max_age,
        dry_run,
    )
    .await?;

    print_json(&report)
}

/// Handles the stats command: shows statistics from the database
fn handle_stats(app: &App) -> anyhow::Result<()> {
    let stats = {
        let storage = lock(&app.storage)?;
        load_statistics(&*storage)?
    };
    print_statistics(&stats);
    Ok(())
}
