//! Queue error types.

use reindex_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    /// Coordination store failure
    #[error("Coordination store error: {0}")]
    Storage(#[from] StorageError),

    /// Job snapshot could not be encoded/decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Reading document content failed
    #[error("Content source error: {0}")]
    Content(String),
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for QueueError {
    fn from(err: std::io::Error) -> Self {
        QueueError::Content(err.to_string())
    }
}
