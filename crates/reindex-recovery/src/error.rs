//! Recovery error types.

use reindex_queue::QueueError;
use reindex_storage::StorageError;
use reindex_strategy::StrategyError;
use reindex_vector::VectorError;
use thiserror::Error;

/// Errors from diagnostics and operator actions.
///
/// [`crate::RecoveryService::recover_on_startup`] never returns these; it
/// counts them in its report instead.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("Coordination store error: {0}")]
    Storage(#[from] StorageError),

    #[error("Vector store error: {0}")]
    Vector(#[from] VectorError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown cleanup action: {0} (expected clear-status or force-delete)")]
    UnknownAction(String),
}

impl From<serde_json::Error> for RecoveryError {
    fn from(err: serde_json::Error) -> Self {
        RecoveryError::Serialization(err.to_string())
    }
}
