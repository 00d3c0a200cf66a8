//! The contract every reindex strategy implements.

use std::time::Duration;

use async_trait::async_trait;
use reindex_types::{InProgressMarker, ScoredChunk};
use reindex_vector::DEFAULT_SEARCH_LIMIT;
use serde::{Deserialize, Serialize};

use crate::error::StrategyError;
use crate::registry::StrategyKind;

/// Options for [`ReindexStrategy::reindex`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReindexOptions {
    /// Artificial stall inside the critical window.
    pub simulate_delay: Option<Duration>,
    /// Business key written to the chunks; defaults to the document id.
    pub document_number: Option<String>,
    /// Retry count of the queued job driving this reindex, recorded in the
    /// in-progress marker so recovery keeps counting.
    pub retry_count: Option<u32>,
}

impl ReindexOptions {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            simulate_delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn document_number(mut self, number: impl Into<String>) -> Self {
        self.document_number = Some(number.into());
        self
    }

    pub fn retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }

    pub(crate) fn number_for<'a>(&'a self, document_id: &'a str) -> &'a str {
        self.document_number.as_deref().unwrap_or(document_id)
    }

    pub(crate) fn marker(&self, document_id: &str, started_at: i64) -> InProgressMarker {
        let marker = InProgressMarker::new(self.number_for(document_id), started_at);
        match self.retry_count {
            Some(count) => marker.with_retry_count(count),
            None => marker,
        }
    }

    pub(crate) async fn stall(&self) {
        if let Some(delay) = self.simulate_delay.filter(|d| !d.is_zero()) {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Options for [`ReindexStrategy::search`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

/// A way of replacing a document's chunks.
///
/// Store failures are returned as-is and leave whatever was already written
/// in place. Nothing is retried and nothing is rolled back.
#[async_trait]
pub trait ReindexStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Replace the document's chunks with a fresh generation built from
    /// `content`.
    async fn reindex(
        &self,
        document_id: &str,
        content: &str,
        options: &ReindexOptions,
    ) -> Result<(), StrategyError>;

    /// Ranked chunks for `query`, filtered by this strategy's visibility rule.
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<ScoredChunk>, StrategyError>;

    /// Remove or retire every chunk of the document.
    async fn delete_by_document_id(&self, document_id: &str) -> Result<(), StrategyError>;

    /// Initial load of a document.
    async fn ingest(
        &self,
        document_id: &str,
        document_number: &str,
        content: &str,
    ) -> Result<(), StrategyError>;

    /// Optional capability; check for it before use.
    fn document_number_search(&self) -> Option<&dyn DocumentNumberSearch> {
        None
    }
}

/// Search restricted to a set of business keys.
#[async_trait]
pub trait DocumentNumberSearch: Send + Sync {
    /// At most [`DEFAULT_SEARCH_LIMIT`] hits whose `documentNumber` is in
    /// `document_numbers`.
    async fn search_by_document_numbers(
        &self,
        query: &str,
        document_numbers: &[String],
    ) -> Result<Vec<ScoredChunk>, StrategyError>;
}
