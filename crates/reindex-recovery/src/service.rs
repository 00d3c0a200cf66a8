//! Scans over coordination and vector store state.

use std::collections::{BTreeMap, BTreeSet};

use reindex_queue::PriorityQueue;
use reindex_storage::keys::{document_id_from_lock_key, LOCK_PREFIX};
use reindex_storage::SharedCoordinationStore;
use reindex_strategy::InProgressMarkers;
use reindex_types::{
    IncompleteVersion, InProgressMarker, LockRecord, RecoveryConfig, SharedClock, StuckDocument,
    StuckLock,
};
use reindex_vector::ChunkRepository;
use tracing::warn;

use crate::error::RecoveryError;

fn minutes_to_ms(minutes: u64) -> i64 {
    i64::try_from(minutes)
        .unwrap_or(i64::MAX)
        .saturating_mul(60_000)
}

/// Finds and repairs state left behind by interrupted reindexes.
#[derive(Clone)]
pub struct RecoveryService {
    pub(crate) coordination: SharedCoordinationStore,
    pub(crate) repository: ChunkRepository,
    pub(crate) queue: PriorityQueue,
    pub(crate) markers: InProgressMarkers,
    pub(crate) clock: SharedClock,
    pub(crate) config: RecoveryConfig,
}

impl RecoveryService {
    pub fn new(
        coordination: SharedCoordinationStore,
        repository: ChunkRepository,
        queue: PriorityQueue,
        clock: SharedClock,
        config: RecoveryConfig,
    ) -> Self {
        Self {
            markers: InProgressMarkers::new(coordination.clone()),
            coordination,
            repository,
            queue,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Markers older than `threshold_minutes`. Unreadable markers are
    /// logged and skipped.
    pub async fn find_stuck_documents(
        &self,
        threshold_minutes: u64,
    ) -> Result<Vec<StuckDocument>, RecoveryError> {
        let now = self.clock.now_ms();
        let threshold = minutes_to_ms(threshold_minutes);
        let mut stuck = Vec::new();

        for (document_id, raw) in self.markers.all_raw().await? {
            let marker = match InProgressMarker::from_json(&raw) {
                Ok(marker) => marker,
                Err(e) => {
                    warn!(document_id = %document_id, error = %e, "Unreadable in-progress marker");
                    continue;
                }
            };
            let age = marker.age_ms(now);
            if age > threshold {
                stuck.push(StuckDocument::new(
                    document_id,
                    marker.document_number,
                    marker.started_at,
                    age,
                ));
            }
        }
        Ok(stuck)
    }

    /// Lock records older than `threshold_minutes`, including ones whose
    /// TTL has lapsed but which are still stored.
    pub async fn find_stuck_locks(
        &self,
        threshold_minutes: u64,
    ) -> Result<Vec<StuckLock>, RecoveryError> {
        let now = self.clock.now_ms();
        let threshold = minutes_to_ms(threshold_minutes);
        let mut stuck = Vec::new();

        for key in self.coordination.keys(LOCK_PREFIX).await? {
            let Some(raw) = self.coordination.get_raw(&key).await? else {
                continue;
            };
            let record = match LockRecord::from_json(&raw) {
                Ok(record) => record,
                Err(e) => {
                    warn!(key = %key, error = %e, "Unreadable lock record");
                    continue;
                }
            };
            let age = record.age_ms(now);
            if age > threshold {
                let ttl = self.coordination.ttl(&key).await?;
                let document_id = document_id_from_lock_key(&key).unwrap_or(&key);
                stuck.push(StuckLock::new(
                    document_id,
                    record.locked_at,
                    age,
                    ttl.as_seconds(),
                ));
            }
        }
        Ok(stuck)
    }

    /// Documents whose chunks carry more than one distinct version.
    pub async fn find_incomplete_versions(&self) -> Result<Vec<IncompleteVersion>, RecoveryError> {
        let records = self.repository.store().scroll(None, false).await?;
        let mut versions: BTreeMap<String, BTreeSet<u64>> = BTreeMap::new();

        for record in records {
            if let Some(version) = record.payload.version {
                versions
                    .entry(record.payload.document_id)
                    .or_default()
                    .insert(version);
            }
        }

        Ok(versions
            .into_iter()
            .filter(|(_, set)| set.len() > 1)
            .map(|(document_id, set)| IncompleteVersion {
                document_id,
                version_count: set.len(),
                versions: set.into_iter().collect(),
            })
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use reindex_storage::MemoryCoordinationStore;
    use reindex_types::{ChunkPayload, ChunkRecord, Clock, ManualClock};
    use reindex_vector::InMemoryVectorStore;
    use std::sync::Arc;
    use std::time::Duration;

    pub(crate) const START: i64 = 1_700_000_000_000;

    pub(crate) fn service() -> (RecoveryService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(START));
        let store: SharedCoordinationStore =
            Arc::new(MemoryCoordinationStore::with_clock(clock.clone()));
        let repository =
            ChunkRepository::new(Arc::new(InMemoryVectorStore::new(4)), clock.clone());
        let queue = PriorityQueue::new(store.clone(), clock.clone());
        let service = RecoveryService::new(
            store,
            repository,
            queue,
            clock.clone(),
            RecoveryConfig::default(),
        );
        (service, clock)
    }

    pub(crate) fn chunk(document_id: &str, index: usize, version: u64) -> ChunkRecord {
        ChunkRecord::new(
            format!("{document_id}-{version}-{index}"),
            vec![1.0, 0.0, 0.0, 0.0],
            ChunkPayload::new(document_id, document_id, index, "text", START).with_version(version),
        )
    }

    #[tokio::test]
    async fn test_stuck_documents_respect_threshold() {
        let (service, clock) = service();
        service
            .markers
            .begin("old", &InProgressMarker::new("OLD", START))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(4 * 60));
        service
            .markers
            .begin("new", &InProgressMarker::new("NEW", clock.now_ms()))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(2 * 60));

        let stuck = service.find_stuck_documents(5).await.unwrap();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].document_id, "old");
        assert_eq!(stuck[0].document_number, "OLD");
        assert_eq!(stuck[0].stuck_duration_ms, 6 * 60_000);
        assert_eq!(stuck[0].stuck_duration_minutes, 6);
    }

    #[test]
    fn test_minutes_to_ms_saturates() {
        assert_eq!(minutes_to_ms(5), 300_000);
        assert_eq!(minutes_to_ms(u64::MAX), i64::MAX);
    }

    #[tokio::test]
    async fn test_corrupt_marker_does_not_hide_others() {
        let (service, clock) = service();
        service
            .coordination
            .hset(reindex_storage::keys::IN_PROGRESS_KEY, "bad", "{not json")
            .await
            .unwrap();
        service
            .markers
            .begin("good", &InProgressMarker::new("GOOD", START))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(10 * 60));

        let stuck = service.find_stuck_documents(5).await.unwrap();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].document_id, "good");
    }

    #[tokio::test]
    async fn test_expired_lock_is_still_reported() {
        let (service, clock) = service();
        let record = LockRecord::new(START, "pid-1");
        service
            .coordination
            .set(
                "lock:doc-1",
                &record.to_json().unwrap(),
                Some(Duration::from_secs(300)),
            )
            .await
            .unwrap();

        clock.advance(Duration::from_secs(9 * 60));
        assert!(service.find_stuck_locks(10).await.unwrap().is_empty());

        clock.advance(Duration::from_secs(2 * 60));
        let stuck = service.find_stuck_locks(10).await.unwrap();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].document_id, "doc-1");
        assert_eq!(stuck[0].lock_duration_minutes, 11);
        assert_eq!(stuck[0].ttl_seconds, 0);
    }

    #[tokio::test]
    async fn test_incomplete_versions() {
        let (service, _clock) = service();
        service
            .repository
            .upsert(vec![
                chunk("split", 0, 1),
                chunk("split", 0, 2),
                chunk("split", 1, 2),
                chunk("clean", 0, 4),
                chunk("clean", 1, 4),
            ])
            .await
            .unwrap();

        let incomplete = service.find_incomplete_versions().await.unwrap();
        assert_eq!(
            incomplete,
            vec![IncompleteVersion {
                document_id: "split".to_string(),
                versions: vec![1, 2],
                version_count: 2,
            }]
        );
    }
}
