//! # reindex-strategy
//!
//! Ways of replacing a document's chunks in the vector store, and what each
//! costs in search availability.
//!
//! | Strategy | Write path | Search sees |
//! |----------|-----------|-------------|
//! | `baseline` | delete, then insert | everything; gap while empty |
//! | `blue-green` | insert version n+1, move pointer, delete version n | `status=active` |
//! | `soft-delete` | insert active, retire chunks older than the start | `status=active` |
//! | `locking` | delete, then insert, under a per-document lock | everything; gap while empty |
//!
//! Strategies are built from a [`StrategyContext`] holding the store
//! handles, so nothing here is process-global.

pub mod availability;
pub mod context;
pub mod error;
pub mod lock;
pub mod markers;
pub mod registry;
pub mod strategy;
pub mod variants;

#[cfg(test)]
pub(crate) mod testing;

pub use availability::{
    compare_strategies, demonstrate_gap, has_document, run_availability_probe, CompareOptions,
    Comparison, GapTimeline, ProbeConfig, ProbeResult, StrategySummary, TimelineEvent,
    TimelineEventKind,
};
pub use context::StrategyContext;
pub use error::StrategyError;
pub use lock::DistributedLock;
pub use markers::{InProgressMarkers, VersionPointers};
pub use registry::{build_strategy, strategy_by_name, StrategyKind};
pub use strategy::{DocumentNumberSearch, ReindexOptions, ReindexStrategy, SearchOptions};
pub use variants::{BaselineStrategy, BlueGreenStrategy, LockingStrategy, SoftDeleteStrategy};
