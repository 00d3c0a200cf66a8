//! # reindex-types
//!
//! Shared domain types for the reindex consistency lab.
//!
//! This crate defines the data model consumed by every other crate:
//! - Chunks: document fragments as stored in the vector store
//! - Jobs: queued asynchronous reindex work and its lifecycle
//! - Markers: in-progress and lock records kept in the coordination store
//! - Diagnostics: what recovery scans report
//! - Settings: layered configuration
//! - Clock: injectable millisecond time source
//!
//! ## Usage
//!
//! ```rust
//! use reindex_types::{Priority, ReindexJob};
//!
//! let job = ReindexJob::new("doc-1", "DOC-001", Priority::High, "user edit", 1_000);
//! assert!(job.score() < ReindexJob::new("doc-2", "DOC-002", Priority::Normal, "bulk", 0).score());
//! ```

pub mod chunk;
pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod job;
pub mod marker;

pub use chunk::{fields, ChunkPayload, ChunkRecord, ChunkStatus, ScoredChunk};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{
    LockConfig, QueueConfig, RecoveryConfig, Settings, SplitterConfig, VectorBackend,
    VectorStoreConfig,
};
pub use diagnostics::{IncompleteVersion, StuckDocument, StuckLock};
pub use error::ReindexError;
pub use job::{JobStatus, Priority, ReindexJob, PRIORITY_SCORE_WEIGHT};
pub use marker::{InProgressMarker, LockRecord};
