//! Mutual exclusion between concurrent writers of one document.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use e2e_tests::TestHarness;
use reindex_embeddings::TextSplitter;
use reindex_storage::keys::LOCK_PREFIX;
use reindex_strategy::{ReindexOptions, ReindexStrategy, StrategyError, StrategyKind};
use reindex_types::LockConfig;

const WRITERS: [&str; 4] = ["alpha", "bravo", "charlie", "delta"];

fn generation_text(word: &str) -> String {
    vec![word; 40].join(" ")
}

fn harness_with_small_chunks() -> TestHarness {
    let mut harness = TestHarness::new();
    harness.context = harness.context.clone().with_splitter(TextSplitter::new(60));
    harness
}

/// Start every writer at once, each stalling between delete and insert.
async fn race_writers(strategy: Arc<dyn ReindexStrategy>, document_id: &str) {
    let handles: Vec<_> = WRITERS
        .iter()
        .map(|word| {
            let strategy = strategy.clone();
            let document_id = document_id.to_string();
            let content = generation_text(word);
            tokio::spawn(async move {
                strategy
                    .reindex(
                        &document_id,
                        &content,
                        &ReindexOptions::with_delay(Duration::from_millis(200)),
                    )
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
}

/// First word of each stored chunk.
async fn generations_present(harness: &TestHarness, document_id: &str) -> BTreeSet<String> {
    harness
        .chunks(document_id)
        .await
        .iter()
        .filter_map(|c| c.content.split_whitespace().next().map(str::to_string))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_locking_leaves_exactly_one_generation() {
    let harness = harness_with_small_chunks();
    let strategy = harness.strategy(StrategyKind::Locking);
    strategy.ingest("doc-1", "DOC-1", "seed").await.unwrap();

    race_writers(strategy, "doc-1").await;

    let present = generations_present(&harness, "doc-1").await;
    assert_eq!(present.len(), 1, "mixed generations: {present:?}");
    let winner = present.iter().next().unwrap();
    let expected = harness
        .context
        .splitter
        .split(&generation_text(winner))
        .len();
    assert!(expected > 1);
    assert_eq!(harness.chunks("doc-1").await.len(), expected);
    assert!(harness
        .coordination
        .keys(LOCK_PREFIX)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_baseline_interleaves_concurrent_writers() {
    let harness = harness_with_small_chunks();
    let strategy = harness.strategy(StrategyKind::Baseline);
    strategy.ingest("doc-1", "DOC-1", "seed").await.unwrap();

    race_writers(strategy, "doc-1").await;

    // Every writer deleted before any inserted, so all generations survive.
    let present = generations_present(&harness, "doc-1").await;
    assert_eq!(present.len(), WRITERS.len());
}

#[tokio::test(start_paused = true)]
async fn test_crashed_holder_blocks_until_recovery_releases_lock() {
    let (harness, clock) = TestHarness::manual();
    let harness = harness.with_lock_config(LockConfig {
        max_attempts: 3,
        retry_delay_ms: 10,
        ..Default::default()
    });
    let strategy = harness.strategy(StrategyKind::Locking);

    // A holder that never releases.
    assert!(harness
        .context
        .distributed_lock()
        .acquire("doc-9")
        .await
        .unwrap());

    let err = strategy
        .reindex("doc-9", "fresh text", &ReindexOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StrategyError::LockNotAcquired { attempts: 3, .. }
    ));
    assert!(harness.chunks("doc-9").await.is_empty());

    clock.advance(Duration::from_secs(11 * 60));
    let stuck = harness.recovery().find_stuck_locks(10).await.unwrap();
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0].document_id, "doc-9");

    let report = harness.recovery().recover_on_startup().await;
    assert_eq!(report.stuck_locks, 1);
    assert_eq!(report.errors, 0);

    strategy
        .reindex("doc-9", "fresh text", &ReindexOptions::default())
        .await
        .unwrap();
    assert_eq!(harness.chunks("doc-9").await.len(), 1);
}
