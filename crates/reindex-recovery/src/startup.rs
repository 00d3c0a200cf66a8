//! Startup recovery.

use reindex_storage::keys::LOCK_PREFIX;
use reindex_types::{InProgressMarker, JobStatus, LockRecord, Priority, ReindexJob};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::RecoveryError;
use crate::service::RecoveryService;

/// Counts of what [`RecoveryService::recover_on_startup`] repaired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    /// Stuck markers re-queued at CRITICAL
    pub orphan_documents: usize,
    /// `processing` snapshots re-queued at HIGH
    pub interrupted_jobs: usize,
    /// Lock records force-deleted
    pub stuck_locks: usize,
    /// Entries skipped because they could not be read or repaired
    pub errors: usize,
}

impl RecoveryService {
    /// Re-queue interrupted work and clear stale locks.
    ///
    /// 1. Every marker older than `stuck_document_minutes` becomes a
    ///    CRITICAL job and the marker is removed.
    /// 2. Every snapshot still `processing` becomes a HIGH job.
    /// 3. Every lock older than `stuck_lock_minutes` is deleted.
    ///
    /// Never fails: each entry that cannot be handled is logged, counted in
    /// `errors`, and the scan moves on.
    pub async fn recover_on_startup(&self) -> RecoveryReport {
        let mut report = RecoveryReport::default();

        self.requeue_orphans(&mut report).await;
        self.requeue_interrupted(&mut report).await;
        self.release_stale_locks(&mut report).await;

        info!(
            orphan_documents = report.orphan_documents,
            interrupted_jobs = report.interrupted_jobs,
            stuck_locks = report.stuck_locks,
            errors = report.errors,
            "Startup recovery finished"
        );
        report
    }

    async fn requeue_orphans(&self, report: &mut RecoveryReport) {
        let entries = match self.markers.all_raw().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Could not list in-progress markers");
                report.errors += 1;
                return;
            }
        };
        let threshold_ms = (self.config.stuck_document_minutes as i64) * 60_000;

        for (document_id, raw) in entries {
            match self.requeue_orphan(&document_id, &raw, threshold_ms).await {
                Ok(true) => report.orphan_documents += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(document_id = %document_id, error = %e, "Orphan recovery failed");
                    report.errors += 1;
                }
            }
        }
    }

    async fn requeue_orphan(
        &self,
        document_id: &str,
        raw: &str,
        threshold_ms: i64,
    ) -> Result<bool, RecoveryError> {
        let marker = InProgressMarker::from_json(raw)?;
        let now = self.clock.now_ms();
        let stuck_ms = marker.age_ms(now);
        if stuck_ms <= threshold_ms {
            return Ok(false);
        }

        // A live snapshot of the crashed job may know more attempts than
        // the marker.
        let snapshot_retries = self
            .queue
            .job(document_id)
            .await?
            .filter(|job| job.status.is_some_and(|s| !s.is_terminal()))
            .map(|job| job.retry_count);
        let retries = marker
            .retry_count
            .unwrap_or(0)
            .max(snapshot_retries.unwrap_or(0));

        let minutes = (stuck_ms as f64 / 60_000.0).round() as i64;
        let job = ReindexJob::new(
            document_id,
            marker.document_number,
            Priority::Critical,
            format!("Recovery after crash - stuck {minutes} min"),
            now,
        )
        .with_retry_count(retries + 1)
        .with_original_error("Service crash during reindex");

        self.queue.enqueue(job).await?;
        self.markers.clear(document_id).await?;
        info!(document_id = %document_id, stuck_minutes = minutes, "Re-queued orphaned reindex");
        Ok(true)
    }

    async fn requeue_interrupted(&self, report: &mut RecoveryReport) {
        let snapshots = match self.queue.raw_snapshots().await {
            Ok(snapshots) => snapshots,
            Err(e) => {
                warn!(error = %e, "Could not list job snapshots");
                report.errors += 1;
                return;
            }
        };

        for (document_id, raw) in snapshots {
            match self.requeue_if_processing(&raw).await {
                Ok(true) => report.interrupted_jobs += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(document_id = %document_id, error = %e, "Interrupted job recovery failed");
                    report.errors += 1;
                }
            }
        }
    }

    async fn requeue_if_processing(&self, raw: &str) -> Result<bool, RecoveryError> {
        let job = ReindexJob::from_json(raw)?;
        if !job.is_status(JobStatus::Processing) {
            return Ok(false);
        }

        let retry = ReindexJob::new(
            job.document_id.clone(),
            job.document_number,
            Priority::High,
            "Interrupted job recovery",
            self.clock.now_ms(),
        )
        .with_retry_count(job.retry_count + 1);
        self.queue.enqueue(retry).await?;
        info!(document_id = %job.document_id, "Re-queued interrupted job");
        Ok(true)
    }

    async fn release_stale_locks(&self, report: &mut RecoveryReport) {
        let keys = match self.coordination.keys(LOCK_PREFIX).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Could not list locks");
                report.errors += 1;
                return;
            }
        };
        let threshold_ms = (self.config.stuck_lock_minutes as i64) * 60_000;

        for key in keys {
            match self.release_if_stale(&key, threshold_ms).await {
                Ok(true) => report.stuck_locks += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(key = %key, error = %e, "Stale lock release failed");
                    report.errors += 1;
                }
            }
        }
    }

    async fn release_if_stale(&self, key: &str, threshold_ms: i64) -> Result<bool, RecoveryError> {
        let Some(raw) = self.coordination.get_raw(key).await? else {
            return Ok(false);
        };
        let record = LockRecord::from_json(&raw)?;
        if record.age_ms(self.clock.now_ms()) <= threshold_ms {
            return Ok(false);
        }
        self.coordination.del(key).await?;
        info!(key = %key, holder = %record.holder, "Force-released stale lock");
        Ok(true)
    }
}
