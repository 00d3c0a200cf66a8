//! Chunk records as stored in the vector store.
//!
//! A chunk is one embeddable fragment of a document. Its payload is
//! serialized with camelCase field names; filters address payload fields by
//! those names (see [`fields`]).

use serde::{Deserialize, Serialize};

/// Payload field names used by vector store filters.
pub mod fields {
    pub const DOCUMENT_ID: &str = "documentId";
    pub const DOCUMENT_NUMBER: &str = "documentNumber";
    pub const CHUNK_INDEX: &str = "chunkIndex";
    pub const VERSION: &str = "version";
    pub const STATUS: &str = "status";
    pub const CREATED_AT: &str = "createdAt";
}

/// Lifecycle status of a chunk, used by status-filtering strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Active,
    Inactive,
    Pending,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStatus::Active => "active",
            ChunkStatus::Inactive => "inactive",
            ChunkStatus::Pending => "pending",
        }
    }
}

impl std::fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload attached to every chunk.
///
/// `chunk_index` is dense from 0 within one generation but repeats across
/// generations. `version` is only set by version-based strategies and
/// `status` only by status-filtering strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPayload {
    pub document_id: String,
    pub document_number: String,
    pub chunk_index: usize,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ChunkStatus>,
    /// Creation time (ms since epoch)
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl ChunkPayload {
    /// Create a payload with no version or status tagging.
    pub fn new(
        document_id: impl Into<String>,
        document_number: impl Into<String>,
        chunk_index: usize,
        content: impl Into<String>,
        created_at: i64,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            document_number: document_number.into(),
            chunk_index,
            content: content.into(),
            version: None,
            status: None,
            created_at,
            updated_at: None,
        }
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_status(mut self, status: ChunkStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Whether this chunk is searchable under a status filter.
    pub fn is_active(&self) -> bool {
        self.status == Some(ChunkStatus::Active)
    }
}

/// A chunk as stored: opaque id, vector and payload.
///
/// `vector` may be empty when the record came from a scroll that did not
/// request vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    #[serde(default)]
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

impl ChunkRecord {
    pub fn new(id: impl Into<String>, vector: Vec<f32>, payload: ChunkPayload) -> Self {
        Self {
            id: id.into(),
            vector,
            payload,
        }
    }
}

/// A ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub id: String,
    pub score: f32,
    pub payload: ChunkPayload,
}
