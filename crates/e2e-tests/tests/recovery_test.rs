//! Crash recovery over a durable coordination store.
//!
//! A reindex is abandoned mid-cutover and a job is left `processing`; the
//! store is then closed and reopened the way a restarted process would.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use e2e_tests::{in_memory_vectors, open_rocks, versioned_chunk, TestHarness, BASE_TS};
use reindex_queue::MapContentSource;
use reindex_recovery::CleanupAction;
use reindex_strategy::{ReindexOptions, StrategyKind};
use reindex_types::{InProgressMarker, JobStatus, ManualClock, Priority, ReindexJob, SharedClock};

#[tokio::test(start_paused = true)]
async fn test_restart_requeues_interrupted_work() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(BASE_TS));
    let shared: SharedClock = clock.clone();
    let vectors = in_memory_vectors();

    {
        let coordination = open_rocks(dir.path(), shared.clone());
        let harness = TestHarness::with_stores(coordination, vectors.clone(), shared.clone());
        let strategy = harness.strategy(StrategyKind::BlueGreen);
        strategy
            .reindex("doc-7", "first edition", &ReindexOptions::default())
            .await
            .unwrap();

        // Abandon a cutover while it stalls, after part of it was written.
        let writer = strategy.clone();
        let handle = tokio::spawn(async move {
            writer
                .reindex(
                    "doc-7",
                    "second edition",
                    &ReindexOptions::with_delay(Duration::from_secs(5)),
                )
                .await
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
        harness
            .context
            .repository
            .upsert(vec![versioned_chunk("doc-7", 0, "second edition", 2, BASE_TS)])
            .await
            .unwrap();

        // A job that was dequeued but never completed.
        harness
            .queue
            .enqueue(ReindexJob::new("doc-8", "DOC-8", Priority::Normal, "edit", BASE_TS))
            .await
            .unwrap();
        harness.queue.dequeue().await.unwrap().unwrap();
    }

    clock.advance(Duration::from_secs(6 * 60));
    let harness =
        TestHarness::with_stores(open_rocks(dir.path(), shared.clone()), vectors, shared);
    let recovery = harness.recovery();

    let stuck = recovery.find_stuck_documents(5).await.unwrap();
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0].document_id, "doc-7");
    assert_eq!(stuck[0].stuck_duration_minutes, 6);

    let incomplete = recovery.find_incomplete_versions().await.unwrap();
    assert_eq!(incomplete.len(), 1);
    assert_eq!(incomplete[0].versions, vec![1, 2]);

    let report = recovery.recover_on_startup().await;
    assert_eq!(report.orphan_documents, 1);
    assert_eq!(report.interrupted_jobs, 1);
    assert_eq!(report.stuck_locks, 0);
    assert_eq!(report.errors, 0);
    assert!(harness.context.markers().get("doc-7").await.unwrap().is_none());

    let status = harness.queue.queue_status().await.unwrap();
    let queued: Vec<(&str, Priority)> = status
        .jobs
        .iter()
        .map(|q| (q.job.document_id.as_str(), q.job.priority))
        .collect();
    assert_eq!(
        queued,
        vec![("doc-7", Priority::Critical), ("doc-8", Priority::High)]
    );
    let orphan = harness.queue.job("doc-7").await.unwrap().unwrap();
    assert_eq!(orphan.retry_count, 1);
    assert_eq!(orphan.reason, "Recovery after crash - stuck 6 min");
    assert_eq!(
        orphan.original_error.as_deref(),
        Some("Service crash during reindex")
    );

    // Drop the stray generation, then let the worker finish the job.
    let cleaned = recovery.cleanup_incomplete_versions("doc-7", 1).await.unwrap();
    assert!(cleaned.success);
    assert_eq!(harness.versions("doc-7").await, vec![1]);

    let source = Arc::new(MapContentSource::new());
    source.insert("doc-7", "second edition");
    source.insert("doc-8", "eighth document");
    let worker = harness.worker(StrategyKind::BlueGreen, source);
    let first = worker.process_next().await.unwrap().unwrap();
    let second = worker.process_next().await.unwrap().unwrap();
    assert_eq!(first.document_id, "doc-7");
    assert_eq!(second.document_id, "doc-8");
    assert_eq!(first.status, JobStatus::Completed);
    assert_eq!(second.status, JobStatus::Completed);
    assert!(worker.process_next().await.unwrap().is_none());

    assert_eq!(harness.versions("doc-7").await, vec![2]);
    assert_eq!(harness.chunks("doc-7").await[0].content, "second edition");
    assert!(recovery.find_incomplete_versions().await.unwrap().is_empty());
    assert!(recovery.find_stuck_documents(5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_version_cleanup_keeps_only_requested_version() {
    let states: [&[u64]; 3] = [&[1, 2], &[3, 4, 5], &[7, 9]];

    for versions in states {
        let (harness, _clock) = TestHarness::manual();
        let mut records = Vec::new();
        for &version in versions {
            for index in 0..3 {
                records.push(versioned_chunk(
                    "doc-v",
                    index,
                    &format!("v{version} part {index}"),
                    version,
                    BASE_TS + version as i64,
                ));
            }
        }
        records.push(versioned_chunk("bystander", 0, "other", 1, BASE_TS));
        harness.context.repository.upsert(records).await.unwrap();

        let keep = versions[versions.len() - 1];
        harness
            .recovery()
            .cleanup_incomplete_versions("doc-v", keep)
            .await
            .unwrap();

        let chunks = harness.chunks("doc-v").await;
        assert_eq!(chunks.len(), 3, "versions {versions:?}");
        assert!(chunks.iter().all(|c| c.version == Some(keep)));
        assert_eq!(harness.chunks("bystander").await.len(), 1);
    }
}

#[tokio::test]
async fn test_force_delete_clears_marker_and_chunks() {
    let (harness, clock) = TestHarness::manual();
    let strategy = harness.strategy(StrategyKind::SoftDelete);
    strategy
        .ingest("doc-3", "DOC-3", "stuck document text")
        .await
        .unwrap();
    harness
        .context
        .markers()
        .begin(
            "doc-3",
            &InProgressMarker::new("DOC-3", BASE_TS),
        )
        .await
        .unwrap();

    clock.advance(Duration::from_secs(10 * 60));
    let recovery = harness.recovery();
    assert_eq!(recovery.find_stuck_documents(5).await.unwrap().len(), 1);

    let result = recovery
        .cleanup_stuck_document("doc-3", CleanupAction::ForceDelete)
        .await
        .unwrap();
    assert!(result.success);
    assert!(harness.chunks("doc-3").await.is_empty());
    assert!(recovery.find_stuck_documents(5).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_repeated_crashes_keep_counting_retries() {
    let (harness, clock) = TestHarness::manual();
    let strategy = harness.strategy(StrategyKind::Locking);
    harness
        .queue
        .enqueue(
            ReindexJob::new("doc-5", "DOC-5", Priority::High, "Retry #2: boom", BASE_TS)
                .with_retry_count(2),
        )
        .await
        .unwrap();

    // The worker dies while the reindex for its job is stalled.
    let job = harness.queue.dequeue().await.unwrap().unwrap();
    let writer = strategy.clone();
    let options = ReindexOptions::with_delay(Duration::from_secs(5))
        .document_number(job.document_number.clone())
        .retry_count(job.retry_count);
    let handle = tokio::spawn(async move { writer.reindex("doc-5", "text", &options).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());

    let marker = harness.context.markers().get("doc-5").await.unwrap().unwrap();
    assert_eq!(marker.retry_count, Some(2));

    clock.advance(Duration::from_secs(20 * 60));
    let report = harness.recovery().recover_on_startup().await;
    assert_eq!(report.orphan_documents, 1);
    assert_eq!(report.stuck_locks, 1);

    let requeued = harness.queue.job("doc-5").await.unwrap().unwrap();
    assert_eq!(requeued.retry_count, 3);
    assert_eq!(requeued.priority, Priority::Critical);
    assert_eq!(requeued.document_number, "DOC-5");
}
