//! Worker pool that runs crawl tasks
//!
//! Workers share one channel receiver and pull one task at a time, so each
//! job is processed end-to-end by a single worker while jobs run in parallel
//! across workers.

use super::{CrawlTask, DispatchError, TaskQueue};
use crate::config::WorkerConfig;
use crate::crawler::CrawlEngine;
use crate::storage::{lock, SharedStorage, Storage};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How failed runs are redelivered
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total runs allowed per task, first delivery included
    pub max_attempts: u32,

    /// Base delay; the n-th redelivery waits `backoff * n`
    pub backoff: Duration,
}

impl From<&WorkerConfig> for RetryPolicy {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

type SharedReceiver = Arc<tokio::sync::Mutex<UnboundedReceiver<CrawlTask>>>;

/// A fixed set of tokio workers fed by an unbounded channel
pub struct WorkerPool {
    sender: Mutex<Option<UnboundedSender<CrawlTask>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawns `count` workers on the current tokio runtime
    ///
    /// # Arguments
    ///
    /// * `count` - Number of jobs processed in parallel
    /// * `engine` - The crawl engine shared by every worker
    /// * `storage` - Record store used to decide whether a failed run is retried
    /// * `policy` - Redelivery policy for failed runs
    pub fn start(
        count: usize,
        engine: Arc<CrawlEngine>,
        storage: SharedStorage,
        policy: RetryPolicy,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver: SharedReceiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = (0..count.max(1))
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    receiver.clone(),
                    engine.clone(),
                    storage.clone(),
                    policy,
                ))
            })
            .collect();

        info!("Started {} crawl workers", count.max(1));

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        }
    }

    /// Closes the queue and waits for every queued and in-flight task
    pub async fn shutdown(&self) -> Result<(), DispatchError> {
        let workers = {
            let mut sender = self.sender.lock().map_err(|_| DispatchError::Poisoned)?;
            sender.take();
            let mut workers = self.workers.lock().map_err(|_| DispatchError::Poisoned)?;
            std::mem::take(&mut *workers)
        };

        for worker in workers {
            worker.await?;
        }

        info!("Crawl workers stopped");
        Ok(())
    }
}

impl TaskQueue for WorkerPool {
    fn enqueue(&self, task: CrawlTask) -> Result<(), DispatchError> {
        let sender = self.sender.lock().map_err(|_| DispatchError::Poisoned)?;
        let sender = sender.as_ref().ok_or(DispatchError::QueueClosed)?;

        debug!("Queued job {}", task.job_id);
        sender.send(task).map_err(|_| DispatchError::QueueClosed)
    }
}

async fn worker_loop(
    id: usize,
    receiver: SharedReceiver,
    engine: Arc<CrawlEngine>,
    storage: SharedStorage,
    policy: RetryPolicy,
) {
    debug!("Worker {} started", id);

    loop {
        let next = receiver.lock().await.recv().await;
        let Some(task) = next else {
            break;
        };
        run_with_retry(id, &task, &engine, &storage, policy).await;
    }

    debug!("Worker {} stopped", id);
}

/// Runs a task, redelivering it while the job is left non-terminal
async fn run_with_retry(
    worker: usize,
    task: &CrawlTask,
    engine: &CrawlEngine,
    storage: &SharedStorage,
    policy: RetryPolicy,
) {
    for attempt in 1..=policy.max_attempts {
        let error = match engine.run(task).await {
            Ok(report) => {
                debug!(
                    "Worker {} finished job {} as {}",
                    worker, report.job_id, report.status
                );
                return;
            }
            Err(e) => e,
        };

        // A job the engine managed to mark failed is final
        if !needs_redelivery(storage, task) {
            warn!("Job {} failed on attempt {}: {}", task.job_id, attempt, error);
            return;
        }

        if attempt == policy.max_attempts {
            error!(
                "Job {} abandoned after {} attempts: {}",
                task.job_id, attempt, error
            );
            return;
        }

        let delay = policy.backoff * attempt;
        warn!(
            "Job {} attempt {} failed ({}), redelivering in {:?}",
            task.job_id, attempt, error, delay
        );
        tokio::time::sleep(delay).await;
    }
}

fn needs_redelivery(storage: &SharedStorage, task: &CrawlTask) -> bool {
    let job = lock(storage).and_then(|storage| storage.get_job(task.job_id));
    match job {
        Ok(Some(job)) => !job.status.is_terminal(),
        Ok(None) => false,
        // The store itself is failing; let the next attempt find out
        Err(_) => true,
    }
}
