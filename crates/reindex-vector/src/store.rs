//! Vector store trait.
//!
//! Defines the narrow surface the strategies need from an external vector
//! database: bulk upsert, filtered delete, filtered similarity search and
//! filtered enumeration.

use std::sync::Arc;

use async_trait::async_trait;
use reindex_types::{ChunkRecord, ScoredChunk};

use crate::error::VectorError;
use crate::filter::Filter;

/// Default number of hits returned by a search.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Trait for chunk stores.
///
/// Each call is atomic on its own; nothing spans calls.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection when it does not exist yet.
    async fn ensure_collection(&self) -> Result<(), VectorError>;

    /// Drop every chunk and recreate the collection.
    async fn reset(&self) -> Result<(), VectorError>;

    /// Insert or replace records by id.
    async fn upsert(&self, records: Vec<ChunkRecord>) -> Result<(), VectorError>;

    async fn delete_by_filter(&self, filter: &Filter) -> Result<(), VectorError>;

    /// Nearest neighbours by cosine similarity, best first.
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredChunk>, VectorError>;

    /// Every matching record. Vectors are left empty unless `with_vector`.
    async fn scroll(
        &self,
        filter: Option<&Filter>,
        with_vector: bool,
    ) -> Result<Vec<ChunkRecord>, VectorError>;

    async fn count(&self, filter: Option<&Filter>) -> Result<usize, VectorError>;
}

/// Shared handle passed to strategies.
pub type SharedVectorStore = Arc<dyn VectorStore>;
