//! Coordination store for the reindex lab.
//!
//! Provides the queue, job table, in-progress markers, locks and version
//! pointers behind one async trait, with:
//! - An in-process implementation for tests and ephemeral runs
//! - A RocksDB implementation with column family isolation and atomic
//!   `WriteBatch` commits for compound operations
//! - Expiry recorded as absolute timestamps so crashed holders remain visible
//!   to recovery scans

pub mod column_families;
pub mod coordination;
pub mod error;
pub mod keys;
pub mod memory;
pub mod rocks;

pub use coordination::{CoordinationStore, KvRecord, SharedCoordinationStore, TtlState};
pub use error::StorageError;
pub use memory::MemoryCoordinationStore;
pub use rocks::RocksCoordinationStore;
