//! Output module for reporting on the crawl database
//!
//! This module handles:
//! - Loading job and page statistics
//! - Printing statistics and JSON views for the CLI

pub mod stats;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};

use serde::Serialize;

/// Serializes a view as pretty-printed JSON
pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}
