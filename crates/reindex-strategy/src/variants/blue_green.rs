//! Versioned generations with insert-before-delete.
//!
//! Each reindex writes generation `current + 1` as active chunks, moves the
//! version pointer, and only then deletes the previous generation. Search
//! filters on `status=active` alone, so for a moment both generations are
//! visible and at no moment is neither.
//!
//! Two concurrent reindexes of one document both read the same pointer and
//! are not serialized.

use async_trait::async_trait;
use reindex_types::ScoredChunk;
use reindex_vector::{active_filter, DEFAULT_SEARCH_LIMIT};
use tracing::info;

use crate::context::{document_number_filter, StrategyContext, Tagging};
use crate::error::StrategyError;
use crate::registry::StrategyKind;
use crate::strategy::{DocumentNumberSearch, ReindexOptions, ReindexStrategy, SearchOptions};

pub struct BlueGreenStrategy {
    ctx: StrategyContext,
}

impl BlueGreenStrategy {
    pub fn new(ctx: StrategyContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ReindexStrategy for BlueGreenStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::BlueGreen
    }

    async fn reindex(
        &self,
        document_id: &str,
        content: &str,
        options: &ReindexOptions,
    ) -> Result<(), StrategyError> {
        let versions = self.ctx.versions();
        let markers = self.ctx.markers();
        let document_number = options.number_for(document_id);

        let current = versions.current(document_id).await?;
        let next = current + 1;

        let marker = options
            .marker(document_id, self.ctx.now_ms())
            .with_versions(current, next);
        markers.begin(document_id, &marker).await?;

        options.stall().await;

        let chunks = self.ctx.build_generation(
            document_id,
            document_number,
            content,
            Tagging::Versioned(next),
        )?;
        let count = chunks.len();
        self.ctx.repository.upsert(chunks).await?;
        versions.set(document_id, next).await?;

        // The new generation is live; the old one can go.
        if current > 0 {
            self.ctx
                .repository
                .delete_by_document_and_version(document_id, current)
                .await?;
        }

        markers.clear(document_id).await?;

        info!(
            strategy = "blue-green",
            document_id = %document_id,
            from_version = current,
            to_version = next,
            chunks = count,
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

    async fn delete_by_document_id(&self, document_id: &str) -> Result<(), StrategyError> {
        self.ctx.repository.delete_by_document(document_id).await?;
        self.ctx.versions().clear(document_id).await?;
        Ok(())
    }

    async fn ingest(
        &self,
        document_id: &str,
        document_number: &str,
        content: &str,
    ) -> Result<(), StrategyError> {
        let versions = self.ctx.versions();
        let next = versions.current(document_id).await? + 1;

        let chunks = self.ctx.build_generation(
            document_id,
            document_number,
            content,
            Tagging::Versioned(next),
        )?;
        self.ctx.repository.upsert(chunks).await?;
        versions.set(document_id, next).await?;
        Ok(())
    }

    fn document_number_search(&self) -> Option<&dyn DocumentNumberSearch> {
        Some(self)
    }
}

#[async_trait]
impl DocumentNumberSearch for BlueGreenStrategy {
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
