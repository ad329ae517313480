//! Job dispatch: handing admitted jobs to the worker pool
//!
//! # Components
//!
//! - `CrawlTask`: the message a worker receives for one job
//! - `TaskQueue`: the enqueue seam between the dispatcher and execution
//! - `WorkerPool`: tokio workers that run the crawl engine, with retries
//! - `JobDispatcher`: admission followed by enqueue

mod pool;

pub use pool::{RetryPolicy, WorkerPool};

use crate::admission::{AdmissionController, CrawlRequest, JobDescriptor};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Errors raised by the task execution facility
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Task queue is closed")]
    QueueClosed,

    #[error("Worker pool state poisoned")]
    Poisoned,

    #[error("Worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Everything a worker needs to run one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTask {
    pub job_id: Uuid,
    pub url: String,
    pub max_depth: u32,
    pub max_pages: u32,
    pub sla_duration: Duration,
}

impl CrawlTask {
    /// Builds the task for an admitted job
    pub fn for_job(job: &JobDescriptor, sla_duration: Duration) -> Self {
        Self {
            job_id: job.job_id,
            url: job.url.clone(),
            max_depth: job.max_depth,
            max_pages: job.max_pages,
            sla_duration,
        }
    }
}

/// Asynchronous execution facility for crawl tasks
///
/// Delivery is at-least-once: a task may be run again after a failure.
pub trait TaskQueue: Send + Sync {
    /// Queues a task and returns immediately
    fn enqueue(&self, task: CrawlTask) -> std::result::Result<(), DispatchError>;
}

/// Accepts submissions and hands admitted jobs to the task queue
pub struct JobDispatcher {
    admission: AdmissionController,
    queue: Arc<dyn TaskQueue>,
}

impl JobDispatcher {
    pub fn new(admission: AdmissionController, queue: Arc<dyn TaskQueue>) -> Self {
        Self { admission, queue }
    }

    /// Admits a job and queues it for execution
    ///
    /// Returns as soon as the task is queued. If queueing fails the job row
    /// stays `queued` and the error is returned.
    pub fn submit(&self, request: &CrawlRequest) -> Result<JobDescriptor> {
        let job = self.admission.admit(request)?;
        let task = CrawlTask::for_job(&job, self.admission.sla_duration());

        self.queue.enqueue(task)?;
        info!("Dispatched job {}", job.job_id);

        Ok(job)
    }
}
