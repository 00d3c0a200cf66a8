//! Collaborators shared by every strategy.

use std::sync::Arc;

use reindex_embeddings::{process_document, EmbeddingModel, HashEmbedder, TextSplitter};
use reindex_storage::SharedCoordinationStore;
use reindex_types::{
    ChunkPayload, ChunkRecord, ChunkStatus, LockConfig, ScoredChunk, SharedClock,
};
use reindex_vector::{ChunkRepository, Condition, Filter, SharedVectorStore};
use uuid::Uuid;

use crate::error::StrategyError;
use crate::lock::DistributedLock;
use crate::markers::{InProgressMarkers, VersionPointers};

/// How a freshly built generation is tagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tagging {
    /// No version or status (delete-then-insert strategies).
    Untagged,
    /// `status=active`.
    Active,
    /// `version=n, status=active`.
    Versioned(u64),
}

/// Store handles, embedder, splitter and clock injected into a strategy.
#[derive(Clone)]
pub struct StrategyContext {
    pub repository: ChunkRepository,
    pub coordination: SharedCoordinationStore,
    pub embedder: Arc<dyn EmbeddingModel>,
    pub splitter: TextSplitter,
    pub clock: SharedClock,
    pub lock: LockConfig,
}

impl StrategyContext {
    /// Context with the hash embedder, default splitter and default lock
    /// tuning.
    pub fn new(
        vectors: SharedVectorStore,
        coordination: SharedCoordinationStore,
        clock: SharedClock,
    ) -> Self {
        Self {
            repository: ChunkRepository::new(vectors, clock.clone()),
            coordination,
            embedder: Arc::new(HashEmbedder::default()),
            splitter: TextSplitter::default(),
            clock,
            lock: LockConfig::default(),
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingModel>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn with_splitter(mut self, splitter: TextSplitter) -> Self {
        self.splitter = splitter;
        self
    }

    pub fn with_lock_config(mut self, lock: LockConfig) -> Self {
        self.lock = lock;
        self
    }

    pub fn markers(&self) -> InProgressMarkers {
        InProgressMarkers::new(self.coordination.clone())
    }

    pub fn versions(&self) -> VersionPointers {
        VersionPointers::new(self.coordination.clone())
    }

    pub fn distributed_lock(&self) -> DistributedLock {
        DistributedLock::new(
            self.coordination.clone(),
            self.clock.clone(),
            self.lock.clone(),
        )
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Split, embed and wrap `content` as one generation of chunk records.
    /// `created_at` is read once, after embedding.
    pub(crate) fn build_generation(
        &self,
        document_id: &str,
        document_number: &str,
        content: &str,
        tagging: Tagging,
    ) -> Result<Vec<ChunkRecord>, StrategyError> {
        let processed = process_document(content, &self.splitter, self.embedder.as_ref())?;
        let created_at = self.clock.now_ms();

        Ok(processed
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| {
                let payload = ChunkPayload::new(
                    document_id,
                    document_number,
                    index,
                    chunk.content,
                    created_at,
                );
                let payload = match tagging {
                    Tagging::Untagged => payload,
                    Tagging::Active => payload.with_status(ChunkStatus::Active),
                    Tagging::Versioned(version) => payload
                        .with_version(version)
                        .with_status(ChunkStatus::Active),
                };
                ChunkRecord::new(Uuid::new_v4().to_string(), chunk.vector, payload)
            })
            .collect())
    }

    /// Embed `query` and search with an optional payload filter.
    pub(crate) async fn search_with(
        &self,
        query: &str,
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredChunk>, StrategyError> {
        let vector = self.embedder.embed(query)?.into_vec();
        Ok(self.repository.search(&vector, limit, filter).await?)
    }
}

/// Restrict `base` (or nothing) to the given document numbers.
pub(crate) fn document_number_filter(base: Option<Filter>, document_numbers: &[String]) -> Filter {
    base.unwrap_or_default().must(Condition::any(
        reindex_types::fields::DOCUMENT_NUMBER,
        document_numbers.iter().cloned(),
    ))
}
