//! Durable priority queue of reindex jobs.
//!
//! Two structures in the coordination store:
//! - `reindex:queue`: ordered set, member = document id, score =
//!   [`ReindexJob::score`]. A document is queued at most once; enqueueing
//!   it again re-scores the existing entry.
//! - `reindex:jobs`: hash of document id to the latest job snapshot, kept
//!   after the job leaves the queue so its status stays visible.
//!
//! Snapshots move `queued -> processing -> completed | failed`. A failed
//! job with retries left is replaced by a fresh HIGH-priority job for the
//! same document, so only the newest attempt is visible.

use reindex_storage::keys::{JOBS_KEY, QUEUE_KEY};
use reindex_storage::SharedCoordinationStore;
use reindex_types::{JobStatus, Priority, QueueConfig, ReindexJob, SharedClock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::QueueError;

/// Result of [`PriorityQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueOutcome {
    pub queued: bool,
    pub score: i64,
    /// 1-based position; entries with a score <= this job's
    pub position: i64,
}

/// Result of [`PriorityQueue::bump_priority`]. A missing job is reported
/// here rather than as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BumpOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_position: Option<i64>,
}

impl BumpOutcome {
    fn failed(reason: &str) -> Self {
        Self {
            success: false,
            error: Some(reason.to_string()),
            new_priority: None,
            new_position: None,
        }
    }
}

/// Result of [`PriorityQueue::complete_job`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteOutcome {
    pub document_id: String,
    pub status: JobStatus,
    /// Retry count of the re-queued job, if one was scheduled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_scheduled: Option<u32>,
}

/// A queued job with its place in line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    #[serde(flatten)]
    pub job: ReindexJob,
    pub score: i64,
    pub position: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobsByPriority {
    pub critical: Vec<QueuedJob>,
    pub high: Vec<QueuedJob>,
    pub normal: Vec<QueuedJob>,
    pub low: Vec<QueuedJob>,
}

impl JobsByPriority {
    fn bucket(&mut self, priority: Priority) -> &mut Vec<QueuedJob> {
        match priority {
            Priority::Critical => &mut self.critical,
            Priority::High => &mut self.high,
            Priority::Normal => &mut self.normal,
            Priority::Low => &mut self.low,
        }
    }
}

/// Snapshot of everything waiting in the queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub total_jobs: usize,
    pub by_priority: JobsByPriority,
    /// In dequeue order
    pub jobs: Vec<QueuedJob>,
}

/// Priority queue handle. Cheap to clone.
#[derive(Clone)]
pub struct PriorityQueue {
    store: SharedCoordinationStore,
    clock: SharedClock,
    max_retries: u32,
}

impl PriorityQueue {
    pub fn new(store: SharedCoordinationStore, clock: SharedClock) -> Self {
        Self::with_config(store, clock, &QueueConfig::default())
    }

    pub fn with_config(
        store: SharedCoordinationStore,
        clock: SharedClock,
        config: &QueueConfig,
    ) -> Self {
        Self {
            store,
            clock,
            max_retries: config.max_retries,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    async fn save(&self, job: &ReindexJob) -> Result<(), QueueError> {
        self.store
            .hset(JOBS_KEY, &job.document_id, &job.to_json()?)
            .await?;
        Ok(())
    }

    /// Latest snapshot for a document.
    pub async fn job(&self, document_id: &str) -> Result<Option<ReindexJob>, QueueError> {
        match self.store.hget(JOBS_KEY, document_id).await? {
            Some(raw) => Ok(Some(ReindexJob::from_json(&raw)?)),
            None => Ok(None),
        }
    }

    /// Every snapshot as stored, undecoded.
    pub async fn raw_snapshots(&self) -> Result<Vec<(String, String)>, QueueError> {
        Ok(self.store.hgetall(JOBS_KEY).await?)
    }

    /// Queue `job` and record a `queued` snapshot.
    pub async fn enqueue(&self, job: ReindexJob) -> Result<EnqueueOutcome, QueueError> {
        let score = job.score();
        let mut snapshot = job;
        snapshot.status = Some(JobStatus::Queued);
        snapshot.queued_at = Some(self.clock.now_ms());
        snapshot.started_at = None;
        snapshot.completed_at = None;
        snapshot.error = None;

        self.store
            .zadd(QUEUE_KEY, &snapshot.document_id, score)
            .await?;
        self.save(&snapshot).await?;

        let position = self.position(&snapshot.document_id).await?;
        info!(
            document_id = %snapshot.document_id,
            priority = %snapshot.priority,
            retry_count = snapshot.retry_count,
            position,
            "Job enqueued"
        );
        Ok(EnqueueOutcome {
            queued: true,
            score,
            position,
        })
    }

    /// Pop the most urgent job and mark it `processing`. `None` when empty.
    pub async fn dequeue(&self) -> Result<Option<ReindexJob>, QueueError> {
        loop {
            let Some((document_id, _score)) = self.store.zpopmin(QUEUE_KEY).await? else {
                return Ok(None);
            };

            let Some(mut job) = self.job(&document_id).await? else {
                warn!(document_id = %document_id, "Queued entry has no snapshot, skipping");
                continue;
            };

            job.status = Some(JobStatus::Processing);
            job.started_at = Some(self.clock.now_ms());
            self.save(&job).await?;

            debug!(document_id = %document_id, priority = %job.priority, "Job dequeued");
            return Ok(Some(job));
        }
    }

    /// 1-based queue position, or -1 when the document is not queued.
    pub async fn position(&self, document_id: &str) -> Result<i64, QueueError> {
        let Some(job) = self.job(document_id).await? else {
            return Ok(-1);
        };
        if !job.is_status(JobStatus::Queued) {
            return Ok(-1);
        }
        let count = self.store.zcount_le(QUEUE_KEY, job.score()).await?;
        Ok(count as i64)
    }

    /// Move a queued job to `new_priority`, keeping its original
    /// `created_at`.
    pub async fn bump_priority(
        &self,
        document_id: &str,
        new_priority: Priority,
    ) -> Result<BumpOutcome, QueueError> {
        let Some(mut job) = self.job(document_id).await? else {
            return Ok(BumpOutcome::failed("Job not found"));
        };
        if !job.is_status(JobStatus::Queued) {
            return Ok(BumpOutcome::failed("Job is not queued"));
        }

        let old_priority = job.priority;
        job.priority = new_priority;
        job.priority_bumped_at = Some(self.clock.now_ms());

        self.store
            .zadd(QUEUE_KEY, document_id, job.score())
            .await?;
        self.save(&job).await?;

        let new_position = self.position(document_id).await?;
        info!(
            document_id = %document_id,
            from = %old_priority,
            to = %new_priority,
            position = new_position,
            "Job priority bumped"
        );
        Ok(BumpOutcome {
            success: true,
            error: None,
            new_priority: Some(new_priority),
            new_position: Some(new_position),
        })
    }

    /// Record the outcome of a dequeued job. A failure with retries left
    /// queues a new HIGH-priority attempt. `None` when the job is unknown
    /// or not `processing`; nothing is changed in that case.
    pub async fn complete_job(
        &self,
        document_id: &str,
        success: bool,
        error: Option<&str>,
    ) -> Result<Option<CompleteOutcome>, QueueError> {
        let Some(mut job) = self.job(document_id).await? else {
            warn!(document_id = %document_id, "Completion for unknown job ignored");
            return Ok(None);
        };
        if !job.is_status(JobStatus::Processing) {
            warn!(
                document_id = %document_id,
                status = ?job.status,
                "Completion for job that is not processing ignored"
            );
            return Ok(None);
        }

        let status = if success {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        job.status = Some(status);
        job.completed_at = Some(self.clock.now_ms());
        job.error = error.map(str::to_string);
        self.save(&job).await?;

        let mut retry_scheduled = None;
        if success {
            info!(document_id = %document_id, "Job completed");
        } else if job.retry_count < self.max_retries {
            let attempt = job.retry_count + 1;
            let cause = error.unwrap_or("unknown error");
            let retry = ReindexJob::new(
                document_id,
                job.document_number.clone(),
                Priority::High,
                format!("Retry #{attempt}: {cause}"),
                self.clock.now_ms(),
            )
            .with_retry_count(attempt)
            .with_original_error(cause);
            warn!(document_id = %document_id, attempt, error = %cause, "Job failed, retrying");
            self.enqueue(retry).await?;
            retry_scheduled = Some(attempt);
        } else {
            warn!(
                document_id = %document_id,
                retries = job.retry_count,
                error = error.unwrap_or("unknown error"),
                "Job failed, retries exhausted"
            );
        }

        Ok(Some(CompleteOutcome {
            document_id: document_id.to_string(),
            status,
            retry_scheduled,
        }))
    }

    /// Drop terminal snapshots completed more than `older_than_minutes` ago.
    pub async fn cleanup_old_jobs(&self, older_than_minutes: u64) -> Result<usize, QueueError> {
        let window_ms = i64::try_from(older_than_minutes)
            .unwrap_or(i64::MAX)
            .saturating_mul(60_000);
        let threshold = self.clock.now_ms().saturating_sub(window_ms);
        let mut cleaned = 0;

        for (document_id, raw) in self.raw_snapshots().await? {
            let job = match ReindexJob::from_json(&raw) {
                Ok(job) => job,
                Err(e) => {
                    warn!(document_id = %document_id, error = %e, "Unreadable job snapshot");
                    continue;
                }
            };
            let terminal = job.status.is_some_and(|s| s.is_terminal());
            if terminal && job.completed_at.is_some_and(|at| at < threshold) {
                self.store.hdel(JOBS_KEY, &document_id).await?;
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            info!(cleaned, older_than_minutes, "Cleaned up old jobs");
        }
        Ok(cleaned)
    }

    /// Everything currently queued, in dequeue order.
    pub async fn queue_status(&self) -> Result<QueueStatus, QueueError> {
        let entries = self.store.zrange(QUEUE_KEY).await?;
        let mut status = QueueStatus::default();

        for (index, (document_id, score)) in entries.into_iter().enumerate() {
            let Some(job) = self.job(&document_id).await? else {
                warn!(document_id = %document_id, "Queued entry has no snapshot");
                continue;
            };
            let queued = QueuedJob {
                job,
                score,
                position: index + 1,
            };
            status
                .by_priority
                .bucket(queued.job.priority)
                .push(queued.clone());
            status.jobs.push(queued);
        }
        status.total_jobs = status.jobs.len();
        Ok(status)
    }
}
