//! Strategy error types.

use reindex_embeddings::EmbeddingError;
use reindex_storage::StorageError;
use reindex_vector::VectorError;
use thiserror::Error;

/// Errors returned by strategies and the distributed lock.
///
/// Store failures pass through unchanged; nothing here is retried.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// Coordination store failure
    #[error("Coordination store error: {0}")]
    Storage(#[from] StorageError),

    /// Vector store failure
    #[error("Vector store error: {0}")]
    Vector(#[from] VectorError),

    /// Embedding failure
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Marker or pointer could not be encoded/decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Lock still held by someone else after every attempt
    #[error("Failed to acquire lock for document {document_id} after {attempts} retries")]
    LockNotAcquired { document_id: String, attempts: u32 },

    /// Strategy name not in the registry
    #[error("Unknown strategy: {name}. Available: {available}")]
    UnknownStrategy { name: String, available: String },
}

impl From<serde_json::Error> for StrategyError {
    fn from(err: serde_json::Error) -> Self {
        StrategyError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_timeout_message() {
        let err = StrategyError::LockNotAcquired {
            document_id: "doc-1".to_string(),
            attempts: 50,
        };
        assert_eq!(
            err.to_string(),
            "Failed to acquire lock for document doc-1 after 50 retries"
        );
    }

    #[test]
    fn test_store_errors_convert() {
        let err: StrategyError = StorageError::Poisoned.into();
        assert!(matches!(err, StrategyError::Storage(StorageError::Poisoned)));
    }
}
