//! Delete-then-insert under a per-document lock.
//!
//! The lock stops two writers from interleaving on one document. Readers
//! never take it, so searches still see the empty window between the delete
//! and the insert.

use async_trait::async_trait;
use reindex_types::ScoredChunk;
use reindex_vector::DEFAULT_SEARCH_LIMIT;
use tracing::info;

use crate::context::{document_number_filter, StrategyContext, Tagging};
use crate::error::StrategyError;
use crate::lock::DistributedLock;
use crate::registry::StrategyKind;
use crate::strategy::{DocumentNumberSearch, ReindexOptions, ReindexStrategy, SearchOptions};

pub struct LockingStrategy {
    ctx: StrategyContext,
    lock: DistributedLock,
}

impl LockingStrategy {
    pub fn new(ctx: StrategyContext) -> Self {
        let lock = ctx.distributed_lock();
        Self { ctx, lock }
    }

    pub fn lock(&self) -> &DistributedLock {
        &self.lock
    }

    async fn replace_chunks(
        &self,
        document_id: &str,
        content: &str,
        options: &ReindexOptions,
    ) -> Result<usize, StrategyError> {
        let markers = self.ctx.markers();
        let document_number = options.number_for(document_id);

        let marker = options.marker(document_id, self.ctx.now_ms());
        markers.begin(document_id, &marker).await?;

        self.ctx.repository.delete_by_document(document_id).await?;
        options.stall().await;

        let chunks =
            self.ctx
                .build_generation(document_id, document_number, content, Tagging::Active)?;
        let count = chunks.len();
        self.ctx.repository.upsert(chunks).await?;

        markers.clear(document_id).await?;
        Ok(count)
    }
}

#[async_trait]
impl ReindexStrategy for LockingStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Locking
    }

    async fn reindex(
        &self,
        document_id: &str,
        content: &str,
        options: &ReindexOptions,
    ) -> Result<(), StrategyError> {
        let count = self
            .lock
            .with_lock(document_id, self.replace_chunks(document_id, content, options))
            .await?;

        info!(strategy = "locking", document_id = %document_id, chunks = count, "Reindexed document");
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<ScoredChunk>, StrategyError> {
        self.ctx.search_with(query, options.limit, None).await
    }

    async fn delete_by_document_id(&self, document_id: &str) -> Result<(), StrategyError> {
        self.lock
            .with_lock(document_id, async {
                self.ctx.repository.delete_by_document(document_id).await?;
                Ok(())
            })
            .await
    }

    async fn ingest(
        &self,
        document_id: &str,
        document_number: &str,
        content: &str,
    ) -> Result<(), StrategyError> {
        self.lock
            .with_lock(document_id, async {
                let chunks = self.ctx.build_generation(
                    document_id,
                    document_number,
                    content,
                    Tagging::Active,
                )?;
                self.ctx.repository.upsert(chunks).await?;
                Ok(())
            })
            .await
    }

    fn document_number_search(&self) -> Option<&dyn DocumentNumberSearch> {
        Some(self)
    }
}

#[async_trait]
impl DocumentNumberSearch for LockingStrategy {
    async fn search_by_document_numbers(
        &self,
        query: &str,
        document_numbers: &[String],
    ) -> Result<Vec<ScoredChunk>, StrategyError> {
        let filter = document_number_filter(None, document_numbers);
        self.ctx
            .search_with(query, DEFAULT_SEARCH_LIMIT, Some(&filter))
            .await
    }
}
