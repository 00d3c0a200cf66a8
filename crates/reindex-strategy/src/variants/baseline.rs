//! Delete-then-insert.
//!
//! Between the delete and the insert the document has no chunks at all and
//! cannot be found. This is the negative control for the other variants.

use async_trait::async_trait;
use reindex_types::ScoredChunk;
use tracing::info;

use crate::context::{document_number_filter, StrategyContext, Tagging};
use crate::error::StrategyError;
use crate::registry::StrategyKind;
use crate::strategy::{DocumentNumberSearch, ReindexOptions, ReindexStrategy, SearchOptions};
use reindex_vector::DEFAULT_SEARCH_LIMIT;

pub struct BaselineStrategy {
    ctx: StrategyContext,
}

impl BaselineStrategy {
    pub fn new(ctx: StrategyContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ReindexStrategy for BaselineStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Baseline
    }

    async fn reindex(
        &self,
        document_id: &str,
        content: &str,
        options: &ReindexOptions,
    ) -> Result<(), StrategyError> {
        self.ctx.repository.delete_by_document(document_id).await?;

        // Document is unsearchable until the upsert lands.
        options.stall().await;

        let chunks = self.ctx.build_generation(
            document_id,
            options.number_for(document_id),
            content,
            Tagging::Untagged,
        )?;
        let count = chunks.len();
        self.ctx.repository.upsert(chunks).await?;

        info!(strategy = "baseline", document_id = %document_id, chunks = count, "Reindexed document");
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
        self.ctx.repository.delete_by_document(document_id).await?;
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
                .build_generation(document_id, document_number, content, Tagging::Untagged)?;
        self.ctx.repository.upsert(chunks).await?;
        Ok(())
    }

    fn document_number_search(&self) -> Option<&dyn DocumentNumberSearch> {
        Some(self)
    }
}

#[async_trait]
impl DocumentNumberSearch for BaselineStrategy {
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
