//! URL handling module
//!
//! This module provides the link normalizer that turns the anchors of a
//! fetched page into the same-domain URLs the crawl frontier accepts.

mod domain;
mod links;

// Re-export main functions
pub use domain::{raw_authority, strip_trailing_slash};
pub use links::{anchor_hrefs, normalize_links};

/// Returns true if `raw` is an absolute http(s) URL with a host
///
/// Used to validate root URLs before a job is created.
pub fn is_crawlable_url(raw: &str) -> bool {
    match ::url::Url::parse(raw) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}
