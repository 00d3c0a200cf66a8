//! Fixtures shared by the unit tests in this crate.

use std::sync::Arc;

use reindex_storage::MemoryCoordinationStore;
use reindex_types::ManualClock;
use reindex_vector::InMemoryVectorStore;

use crate::context::StrategyContext;

pub(crate) use crate::availability::has_document;

/// In-memory context pinned to a manual clock.
pub(crate) fn context() -> (StrategyContext, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let ctx = StrategyContext::new(
        Arc::new(InMemoryVectorStore::new(reindex_embeddings::HASH_EMBEDDING_DIM)),
        Arc::new(MemoryCoordinationStore::with_clock(clock.clone())),
        clock.clone(),
    );
    (ctx, clock)
}
