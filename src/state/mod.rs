//! State module for tracking job progress
//!
//! # Components
//!
//! - `JobStatus`: the one-directional job lifecycle (queued, running, completed, failed)

mod job_status;

// Re-export main types
pub use job_status::JobStatus;
