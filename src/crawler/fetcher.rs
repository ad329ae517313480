//! Page fetcher implementation
//!
//! This module defines the fetch collaborator the crawl engine depends on and
//! its reqwest-backed implementation:
//! - A `Fetcher` opens one `FetchSession` per job
//! - The session is reused for every page of that job, then closed
//! - Errors are classified as page-level or fatal for the session

use crate::config::FetcherConfig;
use crate::crawler::parser::parse_html;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Maximum redirect hops followed for a single page
const MAX_REDIRECTS: usize = 10;

/// Everything the crawl engine needs from one fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Raw HTML body
    pub html: String,
    /// Visible text for the search index
    pub plain_text: String,
    /// Page title, if any
    pub title: Option<String>,
    /// Raw anchor targets, not yet normalized
    pub links: Vec<String>,
    /// HTTP status code of the final response
    pub http_status: u16,
}

/// Errors raised while fetching a page
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request failed: {0}")]
    Request(String),

    /// The response is not an HTML document
    #[error("Content type mismatch: expected text/html, got '{0}'")]
    ContentMismatch(String),

    /// The session itself is unusable; no further page can be fetched
    #[error("Fetch session unavailable: {0}")]
    SessionUnavailable(String),
}

impl FetchError {
    /// Returns true if the error ends the whole job rather than one page
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SessionUnavailable(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(e.to_string())
        } else if e.is_connect() {
            FetchError::Connect(e.to_string())
        } else {
            FetchError::Request(e.to_string())
        }
    }
}

/// Source of fetch sessions, constructed once per process
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Opens a session owned exclusively by one job run
    async fn open_session(&self) -> Result<Box<dyn FetchSession>, FetchError>;
}

/// A fetch session held open for the duration of one job
#[async_trait]
pub trait FetchSession: Send {
    /// Fetches one URL; the call carries its own timeout
    async fn fetch(&mut self, url: &str) -> Result<FetchedPage, FetchError>;

    /// Releases the session's resources
    async fn close(self: Box<Self>);
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The fetcher configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &FetcherConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetcher backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    config: FetcherConfig,
}

impl HttpFetcher {
    pub fn new(config: FetcherConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn open_session(&self) -> Result<Box<dyn FetchSession>, FetchError> {
        let client = build_http_client(&self.config)
            .map_err(|e| FetchError::SessionUnavailable(e.to_string()))?;
        Ok(Box::new(HttpSession {
            client: Some(client),
        }))
    }
}

/// One reqwest client, exclusively owned by a job run
pub struct HttpSession {
    client: Option<Client>,
}

#[async_trait]
impl FetchSession for HttpSession {
    /// Fetches a URL and parses the body
    ///
    /// Any HTML response counts as a successful fetch, whatever its status.
    /// Transport failures and non-HTML bodies are errors; the body of a
    /// non-HTML response is never read.
    async fn fetch(&mut self, url: &str) -> Result<FetchedPage, FetchError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| FetchError::SessionUnavailable("session closed".to_string()))?;

        let response = client.get(url).send().await?;
        let http_status = response.status().as_u16();

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.to_ascii_lowercase().contains("text/html") {
            return Err(FetchError::ContentMismatch(content_type));
        }

        let html = response.text().await?;

        debug!("Fetched {} ({}, {} bytes)", url, http_status, html.len());

        let parsed = parse_html(&html);
        Ok(FetchedPage {
            html,
            plain_text: parsed.plain_text,
            title: parsed.title,
            links: parsed.hrefs,
            http_status,
        })
    }

    async fn close(mut self: Box<Self>) {
        self.client.take();
    }
}
