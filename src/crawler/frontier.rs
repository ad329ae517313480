//! Breadth-first crawl frontier
//!
//! A FIFO queue of (url, depth) pairs. Children are pushed behind everything
//! already queued, so pages are attempted shallow-first.

use std::collections::VecDeque;

/// A URL waiting in the frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    /// The URL to fetch
    pub url: String,

    /// Link distance from the job's root URL
    pub depth: u32,
}

/// FIFO frontier for one job run
///
/// Entries are not deduplicated on push; the crawl engine decides whether a
/// URL still needs fetching when the entry is popped.
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<FrontierEntry>,
}

impl Frontier {
    /// Creates a frontier seeded with the root URL at depth 0
    pub fn seeded(root_url: &str) -> Self {
        let mut frontier = Self::default();
        frontier.push(root_url.to_string(), 0);
        frontier
    }

    /// Appends an entry at the back of the queue
    pub fn push(&mut self, url: String, depth: u32) {
        self.queue.push_back(FrontierEntry { url, depth });
    }

    /// Appends every link as a child of a page at `parent_depth`
    pub fn push_children<I>(&mut self, links: I, parent_depth: u32)
    where
        I: IntoIterator<Item = String>,
    {
        for link in links {
            self.push(link, parent_depth + 1);
        }
    }

    /// Removes and returns the oldest entry
    pub fn pop(&mut self) -> Option<FrontierEntry> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}
