//! Coordination store abstraction.
//!
//! A small Redis-like surface: ordered sets for the queue, hashes for job and
//! marker tables, and plain keys with optional expiry for locks and version
//! pointers. Ordered sets, hashes and plain keys live in separate namespaces.
//!
//! Expiry is recorded as an absolute `expires_at_ms`. An expired key reads as
//! absent through [`CoordinationStore::get`] and [`CoordinationStore::set_nx`]
//! but keeps its record until deleted, so [`CoordinationStore::keys`] still
//! lists it for recovery scans.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Remaining lifetime of a plain key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlState {
    /// No record under this key
    Missing,
    /// Record without expiry
    Persistent,
    /// Whole seconds left, rounded up
    Remaining(u64),
    /// Expiry passed but the record was not yet deleted
    Expired,
}

impl TtlState {
    /// Redis-style number: -2 missing, -1 persistent, 0 expired.
    pub fn as_seconds(&self) -> i64 {
        match self {
            TtlState::Missing => -2,
            TtlState::Persistent => -1,
            TtlState::Remaining(secs) => *secs as i64,
            TtlState::Expired => 0,
        }
    }
}

/// Stored form of a plain key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KvRecord {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<i64>,
}

impl KvRecord {
    pub fn new(value: impl Into<String>, now_ms: i64, ttl: Option<Duration>) -> Self {
        Self {
            value: value.into(),
            expires_at_ms: ttl.map(|ttl| now_ms + ttl.as_millis() as i64),
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms.is_some_and(|at| at <= now_ms)
    }

    pub fn ttl_state(&self, now_ms: i64) -> TtlState {
        match self.expires_at_ms {
            None => TtlState::Persistent,
            Some(at) if at <= now_ms => TtlState::Expired,
            Some(at) => TtlState::Remaining(((at - now_ms) as u64).div_ceil(1000)),
        }
    }
}

/// Key/value and ordered-set substrate shared by strategies, queue and recovery.
///
/// Every single operation is atomic. Compound sequences across calls are not.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Insert `member` or move it to `score`. A member appears at most once.
    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), StorageError>;

    /// Remove `member`; true when it was present.
    async fn zrem(&self, key: &str, member: &str) -> Result<bool, StorageError>;

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>, StorageError>;

    /// Atomically remove and return the lowest-scored member.
    async fn zpopmin(&self, key: &str) -> Result<Option<(String, i64)>, StorageError>;

    /// Number of members with score <= `max_score`.
    async fn zcount_le(&self, key: &str, max_score: i64) -> Result<usize, StorageError>;

    /// All members in ascending score order.
    async fn zrange(&self, key: &str) -> Result<Vec<(String, i64)>, StorageError>;

    async fn zcard(&self, key: &str) -> Result<usize, StorageError>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StorageError>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StorageError>;

    /// Remove a field; true when it was present.
    async fn hdel(&self, key: &str, field: &str) -> Result<bool, StorageError>;

    /// All `(field, value)` pairs, ordered by field.
    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, StorageError>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>)
        -> Result<(), StorageError>;

    /// Write only if no live value exists; true when written.
    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>)
        -> Result<bool, StorageError>;

    /// Live value, or None when missing or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Raw stored value, ignoring expiry.
    async fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Remove a record; true when one was stored, expired or not.
    async fn del(&self, key: &str) -> Result<bool, StorageError>;

    /// Plain keys starting with `prefix`, including expired ones.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    async fn ttl(&self, key: &str) -> Result<TtlState, StorageError>;
}

/// Shared handle passed to every component.
pub type SharedCoordinationStore = Arc<dyn CoordinationStore>;
