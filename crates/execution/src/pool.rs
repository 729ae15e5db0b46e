//! Execution worker pool.
//!
//! A bounded set of workers drains the job queue concurrently, all gated
//! by one shared jobs-per-minute limiter that respects upstream
//! transaction-submission limits. Per-job failures are logged and
//! isolated; nothing a single job does can take a worker down.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use tokio::sync::watch;

use sniper_coordination::JobQueue;
use sniper_core::ExecutionConfig;

use crate::worker::{ExecutionWorker, JobOutcome};

pub struct ExecutionWorkerPool {
    worker: Arc<ExecutionWorker>,
    queue: Arc<dyn JobQueue>,
    limiter: Arc<DefaultDirectRateLimiter>,
    config: ExecutionConfig,
}

impl ExecutionWorkerPool {
    #[must_use]
    pub fn new(
        worker: Arc<ExecutionWorker>,
        queue: Arc<dyn JobQueue>,
        config: ExecutionConfig,
    ) -> Self {
        let per_minute =
            NonZeroU32::new(config.jobs_per_minute).unwrap_or_else(|| nonzero!(1u32));
        let limiter = Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)));
        Self {
            worker,
            queue,
            limiter,
            config,
        }
    }

    /// Spawns the worker loops and waits for all of them to stop.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        let workers = self.config.workers.max(1);
        tracing::info!(
            workers,
            jobs_per_minute = self.config.jobs_per_minute,
            "execution worker pool started"
        );

        let mut handles = Vec::with_capacity(workers);
        for slot in 0..workers {
            let pool = Arc::clone(&self);
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(pool.worker_loop(slot, shutdown)));
        }
        for handle in handles {
            let _ = handle.await;
        }
        tracing::info!("execution worker pool stopped");
    }

    async fn worker_loop(self: Arc<Self>, slot: usize, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.queue.claim().await {
                Ok(Some(job)) => {
                    // The claim is spent either way; the limiter just
                    // spaces out the actual submissions.
                    self.limiter.until_ready().await;
                    match self.worker.process(&job).await {
                        Ok(JobOutcome::Completed { position_id }) => {
                            tracing::info!(slot, job_id = %job.job_id, position_id = %position_id, "job completed");
                        }
                        Ok(JobOutcome::Aborted(reason)) => {
                            tracing::info!(slot, job_id = %job.job_id, reason = reason.as_str(), "job aborted");
                        }
                        Err(err) => {
                            tracing::error!(slot, job_id = %job.job_id, error = %err, "job failed");
                        }
                    }
                }
                Ok(None) => {
                    let idle = Duration::from_millis(self.config.queue_poll_ms.max(10));
                    tokio::select! {
                        () = tokio::time::sleep(idle) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(err) => {
                    tracing::error!(slot, error = %err, "queue claim failed");
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
        }
        tracing::debug!(slot, "execution worker stopped");
    }
}
