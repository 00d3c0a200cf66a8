//! TTL-bounded per-document lock on the coordination store.
//!
//! A lock is a `lock:{documentId}` key written with set-if-absent and a TTL,
//! so a holder that crashes blocks others for at most the TTL. Release is an
//! unconditional delete. [`DistributedLock::with_lock`] scopes a critical
//! section so the key is deleted on every exit path that returns.

use std::future::Future;
use std::time::Duration;

use reindex_storage::keys::lock_key;
use reindex_storage::SharedCoordinationStore;
use reindex_types::{LockConfig, LockRecord, SharedClock};
use tracing::{debug, warn};

use crate::error::StrategyError;

/// Per-document mutual exclusion.
#[derive(Clone)]
pub struct DistributedLock {
    store: SharedCoordinationStore,
    clock: SharedClock,
    config: LockConfig,
}

impl DistributedLock {
    pub fn new(store: SharedCoordinationStore, clock: SharedClock, config: LockConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Single set-if-absent attempt. Never waits.
    pub async fn acquire(&self, document_id: &str) -> Result<bool, StrategyError> {
        let record = LockRecord::for_current_process(self.clock.now_ms());
        let acquired = self
            .store
            .set_nx(
                &lock_key(document_id),
                &record.to_json()?,
                Some(Duration::from_secs(self.config.ttl_secs)),
            )
            .await?;
        if acquired {
            debug!(document_id = %document_id, holder = %record.holder, "Lock acquired");
        }
        Ok(acquired)
    }

    /// Retry [`acquire`](Self::acquire) up to `max_attempts` times,
    /// `retry_delay_ms` apart. Returns `false` once attempts run out.
    pub async fn wait_acquire(&self, document_id: &str) -> Result<bool, StrategyError> {
        let delay = Duration::from_millis(self.config.retry_delay_ms);
        for attempt in 1..=self.config.max_attempts {
            if self.acquire(document_id).await? {
                return Ok(true);
            }
            if attempt < self.config.max_attempts {
                tokio::time::sleep(delay).await;
            }
        }
        warn!(
            document_id = %document_id,
            attempts = self.config.max_attempts,
            "Lock acquisition timed out"
        );
        Ok(false)
    }

    /// Delete the lock key whoever holds it.
    pub async fn release(&self, document_id: &str) -> Result<bool, StrategyError> {
        let released = self.store.del(&lock_key(document_id)).await?;
        debug!(document_id = %document_id, released, "Lock released");
        Ok(released)
    }

    /// Run `critical` while holding the document's lock.
    ///
    /// Fails with [`StrategyError::LockNotAcquired`] without polling
    /// `critical` if the lock stays taken. The lock is released whether
    /// `critical` succeeds or fails; the section's own error wins over a
    /// release error.
    pub async fn with_lock<T, F>(&self, document_id: &str, critical: F) -> Result<T, StrategyError>
    where
        F: Future<Output = Result<T, StrategyError>> + Send,
        T: Send,
    {
        if !self.wait_acquire(document_id).await? {
            return Err(StrategyError::LockNotAcquired {
                document_id: document_id.to_string(),
                attempts: self.config.max_attempts,
            });
        }

        let outcome = critical.await;
        let released = self.release(document_id).await;

        match (outcome, released) {
            (Ok(value), Ok(_)) => Ok(value),
            (Ok(_), Err(release_err)) => Err(release_err),
            (Err(err), Ok(_)) => Err(err),
            (Err(err), Err(release_err)) => {
                warn!(
                    document_id = %document_id,
                    error = %release_err,
                    "Lock release failed after section error; TTL will expire it"
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reindex_storage::MemoryCoordinationStore;
    use reindex_types::ManualClock;
    use std::sync::Arc;

    fn lock_with(config: LockConfig) -> (DistributedLock, SharedCoordinationStore) {
        let clock = Arc::new(ManualClock::new(1_000));
        let store: SharedCoordinationStore =
            Arc::new(MemoryCoordinationStore::with_clock(clock.clone()));
        (DistributedLock::new(store.clone(), clock, config), store)
    }

    #[tokio::test]
    async fn test_acquire_is_exclusive_until_release() {
        let (lock, store) = lock_with(LockConfig::default());

        assert!(lock.acquire("doc-1").await.unwrap());
        assert!(!lock.acquire("doc-1").await.unwrap());
        assert!(lock.acquire("doc-2").await.unwrap());

        let raw = store.get("lock:doc-1").await.unwrap().unwrap();
        let record = LockRecord::from_json(&raw).unwrap();
        assert_eq!(record.locked_at, 1_000);

        assert!(lock.release("doc-1").await.unwrap());
        assert!(!lock.release("doc-1").await.unwrap());
        assert!(lock.acquire("doc-1").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_acquire_gives_up_after_bounded_attempts() {
        let config = LockConfig {
            max_attempts: 5,
            retry_delay_ms: 100,
            ..Default::default()
        };
        let (lock, _store) = lock_with(config);
        assert!(lock.acquire("doc-1").await.unwrap());

        let started = tokio::time::Instant::now();
        assert!(!lock.wait_acquire("doc-1").await.unwrap());
        // Four waits between five attempts.
        assert_eq!(started.elapsed(), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_acquire_succeeds_once_released() {
        let (lock, _store) = lock_with(LockConfig::default());
        assert!(lock.acquire("doc-1").await.unwrap());

        let releaser = lock.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            releaser.release("doc-1").await.unwrap();
        });

        assert!(lock.wait_acquire("doc-1").await.unwrap());
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_lock_releases_on_error() {
        let (lock, store) = lock_with(LockConfig::default());

        let result: Result<(), StrategyError> = lock
            .with_lock("doc-1", async {
                Err(StrategyError::Serialization("boom".to_string()))
            })
            .await;
        assert!(matches!(result, Err(StrategyError::Serialization(_))));
        assert_eq!(store.get("lock:doc-1").await.unwrap(), None);

        let value = lock.with_lock("doc-1", async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert_eq!(store.get("lock:doc-1").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_lock_times_out_with_distinct_error() {
        let config = LockConfig {
            max_attempts: 3,
            ..Default::default()
        };
        let (lock, _store) = lock_with(config);
        assert!(lock.acquire("doc-1").await.unwrap());

        let result = lock.with_lock("doc-1", async { Ok(()) }).await;
        match result {
            Err(StrategyError::LockNotAcquired {
                document_id,
                attempts,
            }) => {
                assert_eq!(document_id, "doc-1");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected lock timeout, got {other:?}"),
        }
    }
}
