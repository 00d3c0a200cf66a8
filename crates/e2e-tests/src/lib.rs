//! End-to-end test infrastructure for reindex-lab.
//!
//! Provides a shared TestHarness wiring strategies, the priority queue and
//! recovery over one pair of stores, plus helpers for building chunk state
//! by hand.

use std::sync::Arc;
use std::time::Duration;

use reindex_embeddings::{EmbeddingModel, HashEmbedder};
use reindex_queue::{ContentSource, PriorityQueue, QueueWorker, WorkerConfig};
use reindex_recovery::RecoveryService;
use reindex_storage::{MemoryCoordinationStore, RocksCoordinationStore, SharedCoordinationStore};
use reindex_strategy::{build_strategy, ReindexStrategy, StrategyContext, StrategyKind};
use reindex_types::{
    ChunkPayload, ChunkRecord, ChunkStatus, Clock, LockConfig, ManualClock, RecoveryConfig,
    SharedClock,
};
use reindex_vector::{InMemoryVectorStore, SharedVectorStore};

/// Fixed epoch for test timestamps (2024-01-29 approx).
pub const BASE_TS: i64 = 1_706_540_400_000;

/// Clock that follows tokio's (possibly paused) timer, so stalls and
/// timestamps advance together under `start_paused`.
#[derive(Debug)]
pub struct TokioClock {
    origin: tokio::time::Instant,
    base_ms: i64,
}

impl TokioClock {
    pub fn new(base_ms: i64) -> Self {
        Self {
            origin: tokio::time::Instant::now(),
            base_ms,
        }
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> i64 {
        self.base_ms + self.origin.elapsed().as_millis() as i64
    }
}

/// Shared test harness for E2E tests.
pub struct TestHarness {
    pub clock: SharedClock,
    pub coordination: SharedCoordinationStore,
    pub vectors: SharedVectorStore,
    pub context: StrategyContext,
    pub queue: PriorityQueue,
}

impl TestHarness {
    /// In-memory stores on a [`TokioClock`]. Must be called inside a runtime.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(TokioClock::new(BASE_TS)))
    }

    /// In-memory stores on a manual clock the caller advances.
    pub fn manual() -> (Self, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(BASE_TS));
        (Self::with_clock(clock.clone()), clock)
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        let coordination = Arc::new(MemoryCoordinationStore::with_clock(clock.clone()));
        Self::with_stores(coordination, in_memory_vectors(), clock)
    }

    pub fn with_stores(
        coordination: SharedCoordinationStore,
        vectors: SharedVectorStore,
        clock: SharedClock,
    ) -> Self {
        let context = StrategyContext::new(vectors.clone(), coordination.clone(), clock.clone());
        let queue = PriorityQueue::new(coordination.clone(), clock.clone());
        Self {
            clock,
            coordination,
            vectors,
            context,
            queue,
        }
    }

    /// Use a different lock tuning for strategies built afterwards.
    pub fn with_lock_config(mut self, lock: LockConfig) -> Self {
        self.context = self.context.with_lock_config(lock);
        self
    }

    pub fn strategy(&self, kind: StrategyKind) -> Arc<dyn ReindexStrategy> {
        build_strategy(kind, self.context.clone())
    }

    pub fn recovery(&self) -> RecoveryService {
        RecoveryService::new(
            self.coordination.clone(),
            self.context.repository.clone(),
            self.queue.clone(),
            self.clock.clone(),
            RecoveryConfig::default(),
        )
    }

    pub fn worker(&self, kind: StrategyKind, source: Arc<dyn ContentSource>) -> QueueWorker {
        let config = WorkerConfig {
            poll_interval: Duration::from_millis(10),
            ..WorkerConfig::default()
        };
        QueueWorker::new(self.queue.clone(), self.strategy(kind), source, config)
    }

    /// Every stored payload of a document, oldest first.
    pub async fn chunks(&self, document_id: &str) -> Vec<ChunkPayload> {
        self.context
            .repository
            .chunks_for_document(document_id)
            .await
            .expect("Failed to read chunks")
    }

    /// Distinct versions stored for a document.
    pub async fn versions(&self, document_id: &str) -> Vec<u64> {
        self.context
            .repository
            .document_summary(document_id)
            .await
            .expect("Failed to summarize document")
            .versions
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn in_memory_vectors() -> SharedVectorStore {
    Arc::new(InMemoryVectorStore::new(reindex_embeddings::HASH_EMBEDDING_DIM))
}

/// Open a RocksDB coordination store in `dir`.
pub fn open_rocks(dir: &std::path::Path, clock: SharedClock) -> SharedCoordinationStore {
    Arc::new(
        RocksCoordinationStore::open_with_clock(dir, clock)
            .expect("Failed to open coordination store"),
    )
}

/// A version-tagged active chunk, as a Blue-Green cutover writes it.
pub fn versioned_chunk(
    document_id: &str,
    chunk_index: usize,
    content: &str,
    version: u64,
    created_at: i64,
) -> ChunkRecord {
    let vector = HashEmbedder::default()
        .embed(content)
        .expect("Failed to embed")
        .into_vec();
    let payload = ChunkPayload::new(document_id, document_id, chunk_index, content, created_at)
        .with_version(version)
        .with_status(ChunkStatus::Active);
    ChunkRecord::new(uuid::Uuid::new_v4().to_string(), vector, payload)
}
