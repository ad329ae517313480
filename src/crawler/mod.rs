//! Crawler module for page fetching and job execution
//!
//! This module contains the core crawling logic, including:
//! - The fetch collaborator and its HTTP implementation
//! - HTML parsing for title, plain text and anchors
//! - The breadth-first frontier
//! - The crawl engine that runs one job end-to-end

mod engine;
mod fetcher;
mod frontier;
mod parser;

pub use engine::{CrawlEngine, CrawlReport, EngineSettings, StopReason};
pub use fetcher::{
    build_http_client, FetchError, FetchSession, FetchedPage, Fetcher, HttpFetcher, HttpSession,
};
pub use frontier::{Frontier, FrontierEntry};
pub use parser::{parse_html, ParsedPage};
