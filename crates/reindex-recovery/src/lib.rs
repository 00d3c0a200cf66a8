//! # reindex-recovery
//!
//! Finds state left behind when a process dies mid-reindex and repairs it.
//!
//! - Stuck documents: in-progress markers older than a threshold
//! - Stuck locks: lock records older than a threshold, even past their TTL
//! - Incomplete versions: documents with chunks from several generations
//!
//! [`RecoveryService::recover_on_startup`] re-queues interrupted work
//! through the priority queue; the other actions are for operators.

pub mod actions;
pub mod error;
pub mod service;
pub mod startup;

pub use actions::{CleanupAction, CleanupResult, LockReleaseResult, VersionCleanupResult};
pub use error::RecoveryError;
pub use service::RecoveryService;
pub use startup::RecoveryReport;
