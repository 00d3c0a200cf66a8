//! # reindex-vector
//!
//! Vector store access for the reindex lab.
//!
//! The strategies only see the [`VectorStore`] trait and the document-level
//! helpers on [`ChunkRepository`]. Two stores are provided:
//! - [`QdrantVectorStore`]: REST client for a Qdrant collection
//! - [`InMemoryVectorStore`]: brute-force store for tests and local runs
//!
//! Filters use Qdrant's wire format and are evaluated locally by the
//! in-memory store, so both behave the same for the supported clauses.

pub mod error;
pub mod filter;
pub mod memory;
pub mod qdrant;
pub mod repository;
pub mod store;

pub use error::VectorError;
pub use filter::{Condition, Filter, Match, Range};
pub use memory::InMemoryVectorStore;
pub use qdrant::{QdrantConfig, QdrantVectorStore};
pub use repository::{
    active_filter, document_filter, ChunkRepository, CreatedAtRange, DocumentChunkCount,
    DocumentStatusCounts, DocumentSummary, StatusCounts,
};
pub use store::{SharedVectorStore, VectorStore, DEFAULT_SEARCH_LIMIT};
