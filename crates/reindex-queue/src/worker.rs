//! Queue worker: dequeue, fetch content, reindex, record the outcome.
//!
//! Failures are handed to [`PriorityQueue::complete_job`], which owns the
//! retry policy. The worker itself never retries.

use std::sync::Arc;
use std::time::Duration;

use reindex_strategy::{ReindexOptions, ReindexStrategy};
use reindex_types::{JobStatus, QueueConfig};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::QueueError;
use crate::queue::PriorityQueue;
use crate::source::ContentSource;

/// What happened to one dequeued job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub document_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_scheduled: Option<u32>,
}

/// Totals for one [`QueueWorker::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cleaned: usize,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub cleanup_interval: Duration,
    pub cleanup_after_minutes: u64,
}

impl From<&QueueConfig> for WorkerConfig {
    fn from(config: &QueueConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            cleanup_interval: Duration::from_secs(config.cleanup_interval_secs),
            cleanup_after_minutes: config.cleanup_after_minutes,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

pub struct QueueWorker {
    queue: PriorityQueue,
    strategy: Arc<dyn ReindexStrategy>,
    source: Arc<dyn ContentSource>,
    config: WorkerConfig,
}

impl QueueWorker {
    pub fn new(
        queue: PriorityQueue,
        strategy: Arc<dyn ReindexStrategy>,
        source: Arc<dyn ContentSource>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            strategy,
            source,
            config,
        }
    }

    /// Handle at most one job. `None` when the queue is empty.
    pub async fn process_next(&self) -> Result<Option<JobOutcome>, QueueError> {
        let Some(job) = self.queue.dequeue().await? else {
            return Ok(None);
        };
        let document_id = job.document_id.as_str();

        let result = match self.source.fetch(document_id).await {
            Ok(Some(content)) => {
                let options = ReindexOptions::default()
                    .document_number(job.document_number.clone())
                    .retry_count(job.retry_count);
                self.strategy
                    .reindex(document_id, &content, &options)
                    .await
                    .map_err(|e| e.to_string())
            }
            Ok(None) => Err("content not found".to_string()),
            Err(e) => Err(e.to_string()),
        };

        let error = result.err();
        if let Some(err) = &error {
            error!(
                document_id = %document_id,
                strategy = self.strategy.name(),
                error = %err,
                "Reindex job failed"
            );
        }
        let completed = self
            .queue
            .complete_job(document_id, error.is_none(), error.as_deref())
            .await?;

        Ok(Some(JobOutcome {
            document_id: document_id.to_string(),
            status: if error.is_none() {
                JobStatus::Completed
            } else {
                JobStatus::Failed
            },
            retry_scheduled: completed.and_then(|c| c.retry_scheduled),
            error,
        }))
    }

    /// Process jobs until `cancel` fires. Sleeps `poll_interval` whenever
    /// the queue is empty and sweeps old terminal jobs every
    /// `cleanup_interval`.
    pub async fn run(&self, cancel: CancellationToken) -> WorkerStats {
        let mut stats = WorkerStats::default();
        let mut last_cleanup = Instant::now();

        info!(strategy = self.strategy.name(), "Queue worker started");

        while !cancel.is_cancelled() {
            let idle = match self.process_next().await {
                Ok(Some(outcome)) => {
                    stats.processed += 1;
                    match outcome.status {
                        JobStatus::Completed => stats.succeeded += 1,
                        _ => stats.failed += 1,
                    }
                    false
                }
                Ok(None) => true,
                Err(e) => {
                    error!(error = %e, "Queue worker iteration failed");
                    true
                }
            };

            if last_cleanup.elapsed() >= self.config.cleanup_interval {
                match self
                    .queue
                    .cleanup_old_jobs(self.config.cleanup_after_minutes)
                    .await
                {
                    Ok(cleaned) => stats.cleaned += cleaned,
                    Err(e) => error!(error = %e, "Job cleanup failed"),
                }
                last_cleanup = Instant::now();
            }

            if idle {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }

        info!(
            processed = stats.processed,
            failed = stats.failed,
            cleaned = stats.cleaned,
            "Queue worker stopped"
        );
        stats
    }
}
