//! Process-local coordination store.
//!
//! Used by tests and single-process runs. Each call yields to the runtime
//! before touching state so concurrent tasks interleave at the same points
//! they would against a remote store.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use reindex_types::{SharedClock, SystemClock};

use crate::coordination::{CoordinationStore, KvRecord, TtlState};
use crate::error::StorageError;

#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, i64>,
    ordered: BTreeSet<(i64, String)>,
}

impl SortedSet {
    fn insert(&mut self, member: &str, score: i64) {
        if let Some(old) = self.scores.insert(member.to_string(), score) {
            self.ordered.remove(&(old, member.to_string()));
        }
        self.ordered.insert((score, member.to_string()));
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.ordered.remove(&(score, member.to_string()));
                true
            }
            None => false,
        }
    }

    fn pop_min(&mut self) -> Option<(String, i64)> {
        let (score, member) = self.ordered.pop_first()?;
        self.scores.remove(&member);
        Some((member, score))
    }
}

#[derive(Debug, Default)]
struct State {
    zsets: HashMap<String, SortedSet>,
    hashes: HashMap<String, BTreeMap<String, String>>,
    kv: BTreeMap<String, KvRecord>,
}

/// In-memory [`CoordinationStore`].
#[derive(Debug)]
pub struct MemoryCoordinationStore {
    state: Mutex<State>,
    clock: SharedClock,
}

impl Default for MemoryCoordinationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCoordinationStore {
    pub fn new() -> Self {
        Self::with_clock(SystemClock::shared())
    }

    /// Store whose key expiry follows `clock`.
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            state: Mutex::new(State::default()),
            clock,
        }
    }

    async fn state(&self) -> Result<MutexGuard<'_, State>, StorageError> {
        tokio::task::yield_now().await;
        self.state.lock().map_err(|_| StorageError::Poisoned)
    }
}

#[async_trait]
impl CoordinationStore for MemoryCoordinationStore {
    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), StorageError> {
        let mut state = self.state().await?;
        state
            .zsets
            .entry(key.to_string())
            .or_default()
            .insert(member, score);
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        let mut state = self.state().await?;
        Ok(state
            .zsets
            .get_mut(key)
            .is_some_and(|set| set.remove(member)))
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>, StorageError> {
        let state = self.state().await?;
        Ok(state
            .zsets
            .get(key)
            .and_then(|set| set.scores.get(member).copied()))
    }

    async fn zpopmin(&self, key: &str) -> Result<Option<(String, i64)>, StorageError> {
        let mut state = self.state().await?;
        Ok(state.zsets.get_mut(key).and_then(SortedSet::pop_min))
    }

    async fn zcount_le(&self, key: &str, max_score: i64) -> Result<usize, StorageError> {
        let state = self.state().await?;
        Ok(state.zsets.get(key).map_or(0, |set| {
            set.ordered
                .iter()
                .take_while(|(score, _)| *score <= max_score)
                .count()
        }))
    }

    async fn zrange(&self, key: &str) -> Result<Vec<(String, i64)>, StorageError> {
        let state = self.state().await?;
        Ok(state.zsets.get(key).map_or_else(Vec::new, |set| {
            set.ordered
                .iter()
                .map(|(score, member)| (member.clone(), *score))
                .collect()
        }))
    }

    async fn zcard(&self, key: &str) -> Result<usize, StorageError> {
        let state = self.state().await?;
        Ok(state.zsets.get(key).map_or(0, |set| set.scores.len()))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StorageError> {
        let mut state = self.state().await?;
        state
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StorageError> {
        let state = self.state().await?;
        Ok(state.hashes.get(key).and_then(|h| h.get(field).cloned()))
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, StorageError> {
        let mut state = self.state().await?;
        Ok(state
            .hashes
            .get_mut(key)
            .is_some_and(|h| h.remove(field).is_some()))
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, StorageError> {
        let state = self.state().await?;
        Ok(state.hashes.get(key).map_or_else(Vec::new, |h| {
            h.iter().map(|(f, v)| (f.clone(), v.clone())).collect()
        }))
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        let now = self.clock.now_ms();
        let mut state = self.state().await?;
        state
            .kv
            .insert(key.to_string(), KvRecord::new(value, now, ttl));
        Ok(())
    }

    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StorageError> {
        let now = self.clock.now_ms();
        let mut state = self.state().await?;
        if state.kv.get(key).is_some_and(|r| !r.is_expired(now)) {
            return Ok(false);
        }
        state
            .kv
            .insert(key.to_string(), KvRecord::new(value, now, ttl));
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let now = self.clock.now_ms();
        let state = self.state().await?;
        Ok(state
            .kv
            .get(key)
            .filter(|r| !r.is_expired(now))
            .map(|r| r.value.clone()))
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        let state = self.state().await?;
        Ok(state.kv.get(key).map(|r| r.value.clone()))
    }

    async fn del(&self, key: &str) -> Result<bool, StorageError> {
        let mut state = self.state().await?;
        Ok(state.kv.remove(key).is_some())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let state = self.state().await?;
        Ok(state
            .kv
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn ttl(&self, key: &str) -> Result<TtlState, StorageError> {
        let now = self.clock.now_ms();
        let state = self.state().await?;
        Ok(state
            .kv
            .get(key)
            .map_or(TtlState::Missing, |r| r.ttl_state(now)))
    }
}
