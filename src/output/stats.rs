//! Statistics generation from the crawl database
//!
//! This module provides functionality for extracting and displaying
//! job and page statistics from the storage layer.

use crate::state::JobStatus;
use crate::storage::{PageCounts, Storage};
use crate::Result;
use serde::Serialize;
use std::collections::HashMap;

/// Crawl statistics summary
#[derive(Debug, Clone, Serialize)]
pub struct CrawlStatistics {
    /// Total number of jobs ever admitted and not yet swept
    pub total_jobs: u64,

    /// Count of jobs by lifecycle status
    pub jobs_by_status: HashMap<JobStatus, u64>,

    /// Page row totals across all jobs
    pub pages: PageCounts,
}

impl CrawlStatistics {
    /// Jobs currently queued or running
    pub fn active_jobs(&self) -> u64 {
        self.jobs_by_status
            .iter()
            .filter(|(status, _)| status.is_active())
            .map(|(_, count)| count)
            .sum()
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(CrawlerError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<CrawlStatistics> {
    let jobs_by_status = storage.count_jobs_by_status()?;
    let total_jobs = jobs_by_status.values().sum();
    let pages = storage.count_pages()?;

    Ok(CrawlStatistics {
        total_jobs,
        jobs_by_status,
        pages,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Jobs:");
    println!("  Total: {}", stats.total_jobs);
    for status in JobStatus::all() {
        let count = stats.jobs_by_status.get(&status).copied().unwrap_or(0);
        println!("  {}: {}", status, count);
    }
    println!();

    println!("Pages:");
    println!("  Total rows: {}", stats.pages.total);
    println!("  Fetched: {}", stats.pages.crawled);
    println!("  Failed: {}", stats.pages.failed);
    println!();

    let success_rate = if stats.pages.total > 0 {
        (stats.pages.crawled as f64 / stats.pages.total as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Success Rate: {:.1}% ({} / {} pages fetched)",
        success_rate, stats.pages.crawled, stats.pages.total
    );
}
