//! RocksDB-backed coordination store.
//!
//! Provides durable queue, job, marker and lock state for a single daemon
//! process. Read-modify-write operations (`zadd` re-score, `zpopmin`,
//! `set_nx`, deletes that report presence) run under an internal mutex and
//! commit through one `WriteBatch`, so they are atomic within the process.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use reindex_types::{SharedClock, SystemClock};
use rocksdb::{ColumnFamily, Direction, IteratorMode, Options, WriteBatch, DB};
use tracing::{debug, info};

use crate::column_families::{build_cf_descriptors, CF_HASHES, CF_KV, CF_ZSCORES, CF_ZSETS};
use crate::coordination::{CoordinationStore, KvRecord, TtlState};
use crate::error::StorageError;
use crate::keys::{
    compound_key, decode_score, decode_zset_entry, encode_score, scan_prefix, sub_key,
    zset_entry_key,
};

/// Durable [`CoordinationStore`] on a local RocksDB instance.
pub struct RocksCoordinationStore {
    db: DB,
    write_lock: Mutex<()>,
    clock: SharedClock,
}

impl RocksCoordinationStore {
    /// Open the store at the given path, creating if necessary.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        Self::open_with_clock(path, SystemClock::shared())
    }

    pub fn open_with_clock(path: &Path, clock: SharedClock) -> Result<Self, StorageError> {
        info!("Opening coordination store at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(2);

        let db = DB::open_cf_descriptors(&db_opts, path, build_cf_descriptors())?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
            clock,
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>, StorageError> {
        self.write_lock.lock().map_err(|_| StorageError::Poisoned)
    }

    /// `(sub_key, value)` pairs under `{key}\0` in a column family.
    fn scan(&self, cf_name: &str, key: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let cf = self.cf(cf_name)?;
        let prefix = scan_prefix(key);
        let mut results = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (k, v) = item?;
            if !k.starts_with(&prefix) {
                break;
            }
            results.push((k.to_vec(), v.to_vec()));
        }
        Ok(results)
    }

    fn read_score(&self, key: &str, member: &str) -> Result<Option<i64>, StorageError> {
        let cf = self.cf(CF_ZSCORES)?;
        match self.db.get_cf(&cf, compound_key(key, member))? {
            Some(bytes) => {
                let s = std::str::from_utf8(&bytes)
                    .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;
                Ok(Some(decode_score(s)?))
            }
            None => Ok(None),
        }
    }

    fn read_kv(&self, key: &str) -> Result<Option<KvRecord>, StorageError> {
        let cf = self.cf(CF_KV)?;
        match self.db.get_cf(&cf, key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_kv(&self, key: &str, record: &KvRecord) -> Result<(), StorageError> {
        let cf = self.cf(CF_KV)?;
        self.db
            .put_cf(&cf, key.as_bytes(), serde_json::to_vec(record)?)?;
        Ok(())
    }
}

#[async_trait]
impl CoordinationStore for RocksCoordinationStore {
    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), StorageError> {
        let _guard = self.guard()?;
        let zsets = self.cf(CF_ZSETS)?;
        let zscores = self.cf(CF_ZSCORES)?;

        let mut batch = WriteBatch::default();
        if let Some(old) = self.read_score(key, member)? {
            batch.delete_cf(&zsets, zset_entry_key(key, member, old));
        }
        batch.put_cf(&zsets, zset_entry_key(key, member, score), b"");
        batch.put_cf(&zscores, compound_key(key, member), encode_score(score));
        self.db.write(batch)?;
        debug!(key, member, score, "zadd");
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        let _guard = self.guard()?;
        let Some(score) = self.read_score(key, member)? else {
            return Ok(false);
        };
        let zsets = self.cf(CF_ZSETS)?;
        let zscores = self.cf(CF_ZSCORES)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&zsets, zset_entry_key(key, member, score));
        batch.delete_cf(&zscores, compound_key(key, member));
        self.db.write(batch)?;
        Ok(true)
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>, StorageError> {
        self.read_score(key, member)
    }

    async fn zpopmin(&self, key: &str) -> Result<Option<(String, i64)>, StorageError> {
        let _guard = self.guard()?;
        let zsets = self.cf(CF_ZSETS)?;
        let zscores = self.cf(CF_ZSCORES)?;
        let prefix = scan_prefix(key);

        let first = {
            let mut iter = self
                .db
                .iterator_cf(&zsets, IteratorMode::From(&prefix, Direction::Forward));
            match iter.next() {
                Some(item) => {
                    let (k, _) = item?;
                    if k.starts_with(&prefix) {
                        Some(k.to_vec())
                    } else {
                        None
                    }
                }
                None => None,
            }
        };

        let Some(entry_key) = first else {
            return Ok(None);
        };
        let (member, score) = decode_zset_entry(&prefix, &entry_key)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&zsets, &entry_key);
        batch.delete_cf(&zscores, compound_key(key, &member));
        self.db.write(batch)?;
        Ok(Some((member, score)))
    }

    async fn zcount_le(&self, key: &str, max_score: i64) -> Result<usize, StorageError> {
        Ok(self
            .zrange(key)
            .await?
            .into_iter()
            .take_while(|(_, score)| *score <= max_score)
            .count())
    }

    async fn zrange(&self, key: &str) -> Result<Vec<(String, i64)>, StorageError> {
        let prefix = scan_prefix(key);
        self.scan(CF_ZSETS, key)?
            .into_iter()
            .map(|(k, _)| decode_zset_entry(&prefix, &k))
            .collect()
    }

    async fn zcard(&self, key: &str) -> Result<usize, StorageError> {
        Ok(self.scan(CF_ZSCORES, key)?.len())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.guard()?;
        let cf = self.cf(CF_HASHES)?;
        self.db.put_cf(&cf, compound_key(key, field), value.as_bytes())?;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StorageError> {
        let cf = self.cf(CF_HASHES)?;
        match self.db.get_cf(&cf, compound_key(key, field))? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| StorageError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, StorageError> {
        let _guard = self.guard()?;
        let cf = self.cf(CF_HASHES)?;
        let compound = compound_key(key, field);
        if self.db.get_cf(&cf, &compound)?.is_none() {
            return Ok(false);
        }
        self.db.delete_cf(&cf, &compound)?;
        Ok(true)
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, StorageError> {
        let prefix = scan_prefix(key);
        self.scan(CF_HASHES, key)?
            .into_iter()
            .map(|(k, v)| {
                let field = sub_key(&prefix, &k)?;
                let value =
                    String::from_utf8(v).map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok((field, value))
            })
            .collect()
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        let _guard = self.guard()?;
        let record = KvRecord::new(value, self.clock.now_ms(), ttl);
        self.write_kv(key, &record)
    }

    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StorageError> {
        let _guard = self.guard()?;
        let now = self.clock.now_ms();
        if self.read_kv(key)?.is_some_and(|r| !r.is_expired(now)) {
            return Ok(false);
        }
        self.write_kv(key, &KvRecord::new(value, now, ttl))?;
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let now = self.clock.now_ms();
        Ok(self
            .read_kv(key)?
            .filter(|r| !r.is_expired(now))
            .map(|r| r.value))
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_kv(key)?.map(|r| r.value))
    }

    async fn del(&self, key: &str) -> Result<bool, StorageError> {
        let _guard = self.guard()?;
        if self.read_kv(key)?.is_none() {
            return Ok(false);
        }
        let cf = self.cf(CF_KV)?;
        self.db.delete_cf(&cf, key.as_bytes())?;
        Ok(true)
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let cf = self.cf(CF_KV)?;
        let mut keys = Vec::new();
        let iter = self.db.iterator_cf(
            &cf,
            IteratorMode::From(prefix.as_bytes(), Direction::Forward),
        );
        for item in iter {
            let (k, _) = item?;
            if !k.starts_with(prefix.as_bytes()) {
                break;
            }
            keys.push(
                String::from_utf8(k.to_vec())
                    .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?,
            );
        }
        Ok(keys)
    }

    async fn ttl(&self, key: &str) -> Result<TtlState, StorageError> {
        let now = self.clock.now_ms();
        Ok(self
            .read_kv(key)?
            .map_or(TtlState::Missing, |r| r.ttl_state(now)))
    }
}
