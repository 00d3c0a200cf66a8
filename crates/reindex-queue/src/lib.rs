//! # reindex-queue
//!
//! Durable, priority-ordered queue of reindex jobs and the worker that
//! drains it.
//!
//! Ordering is priority first, then creation time. Failed jobs are retried
//! up to `max_retries` times at HIGH priority; that is the only retry in
//! the system.

pub mod error;
pub mod queue;
pub mod source;
pub mod worker;

pub use error::QueueError;
pub use queue::{
    BumpOutcome, CompleteOutcome, EnqueueOutcome, JobsByPriority, PriorityQueue, QueueStatus,
    QueuedJob,
};
pub use source::{ContentSource, DirectoryContentSource, MapContentSource};
pub use worker::{JobOutcome, QueueWorker, WorkerConfig, WorkerStats};
