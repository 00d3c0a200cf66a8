//! Timestamp cutover.
//!
//! The reindex start time is taken before anything is written. New chunks
//! go in as active, then every still-active chunk of the document created
//! strictly before that start time is marked inactive. Chunks created at or
//! after the start are never retired by that call.

use async_trait::async_trait;
use reindex_types::ScoredChunk;
use reindex_vector::{active_filter, DEFAULT_SEARCH_LIMIT};
use tracing::info;

use crate::context::{document_number_filter, StrategyContext, Tagging};
use crate::error::StrategyError;
use crate::registry::StrategyKind;
use crate::strategy::{DocumentNumberSearch, ReindexOptions, ReindexStrategy, SearchOptions};

pub struct SoftDeleteStrategy {
    ctx: StrategyContext,
}

impl SoftDeleteStrategy {
    pub fn new(ctx: StrategyContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ReindexStrategy for SoftDeleteStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SoftDelete
    }

    async fn reindex(
        &self,
        document_id: &str,
        content: &str,
        options: &ReindexOptions,
    ) -> Result<(), StrategyError> {
        let markers = self.ctx.markers();
        let document_number = options.number_for(document_id);

        let started_at = self.ctx.now_ms();
        markers
            .begin(document_id, &options.marker(document_id, started_at))
            .await?;

        options.stall().await;

        let chunks =
            self.ctx
                .build_generation(document_id, document_number, content, Tagging::Active)?;
        let count = chunks.len();
        self.ctx.repository.upsert(chunks).await?;

        let retired = self
            .ctx
            .repository
            .mark_inactive_older_than(document_id, started_at)
            .await?;

        markers.clear(document_id).await?;

        info!(
            strategy = "soft-delete",
            document_id = %document_id,
            chunks = count,
            retired,
            "Reindexed document"
        );
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<ScoredChunk>, StrategyError> {
        self.ctx
            .search_with(query, options.limit, Some(&active_filter()))
            .await
    }

    /// Logical delete: chunks stay in the store as inactive.
    async fn delete_by_document_id(&self, document_id: &str) -> Result<(), StrategyError> {
        let retired = self.ctx.repository.mark_inactive(document_id).await?;
        info!(strategy = "soft-delete", document_id = %document_id, retired, "Retired document");
        Ok(())
    }

    async fn ingest(
        &self,
        document_id: &str,
        document_number: &str,
        content: &str,
    ) -> Result<(), StrategyError> {
        let chunks =
            self.ctx
                .build_generation(document_id, document_number, content, Tagging::Active)?;
        self.ctx.repository.upsert(chunks).await?;
        Ok(())
    }

    fn document_number_search(&self) -> Option<&dyn DocumentNumberSearch> {
        Some(self)
    }
}

#[async_trait]
impl DocumentNumberSearch for SoftDeleteStrategy {
    async fn search_by_document_numbers(
        &self,
        query: &str,
        document_numbers: &[String],
    ) -> Result<Vec<ScoredChunk>, StrategyError> {
        let filter = document_number_filter(Some(active_filter()), document_numbers);
        self.ctx
            .search_with(query, DEFAULT_SEARCH_LIMIT, Some(&filter))
            .await
    }
}
