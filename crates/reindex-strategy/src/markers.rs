//! Bookkeeping records strategies keep in the coordination store.
//!
//! - [`InProgressMarkers`]: the `reindex:in_progress` hash, one entry per
//!   document mid-reindex. An entry that outlives its reindex is how
//!   recovery spots a crash.
//! - [`VersionPointers`]: `version:{documentId}` keys holding the current
//!   blue-green generation.

use reindex_storage::keys::{version_key, IN_PROGRESS_KEY};
use reindex_storage::SharedCoordinationStore;
use reindex_types::InProgressMarker;
use tracing::debug;

use crate::error::StrategyError;

/// Access to in-progress markers.
#[derive(Clone)]
pub struct InProgressMarkers {
    store: SharedCoordinationStore,
}

impl InProgressMarkers {
    pub fn new(store: SharedCoordinationStore) -> Self {
        Self { store }
    }

    /// Announce that `document_id` is being reindexed. Overwrites any
    /// existing marker.
    pub async fn begin(
        &self,
        document_id: &str,
        marker: &InProgressMarker,
    ) -> Result<(), StrategyError> {
        self.store
            .hset(IN_PROGRESS_KEY, document_id, &marker.to_json()?)
            .await?;
        debug!(document_id = %document_id, "In-progress marker written");
        Ok(())
    }

    /// Remove the marker. Returns whether one existed.
    pub async fn clear(&self, document_id: &str) -> Result<bool, StrategyError> {
        Ok(self.store.hdel(IN_PROGRESS_KEY, document_id).await?)
    }

    pub async fn get(&self, document_id: &str) -> Result<Option<InProgressMarker>, StrategyError> {
        match self.store.hget(IN_PROGRESS_KEY, document_id).await? {
            Some(raw) => Ok(Some(InProgressMarker::from_json(&raw)?)),
            None => Ok(None),
        }
    }

    /// Every marker as stored, undecoded, so one corrupt entry does not
    /// hide the others.
    pub async fn all_raw(&self) -> Result<Vec<(String, String)>, StrategyError> {
        Ok(self.store.hgetall(IN_PROGRESS_KEY).await?)
    }
}

/// Access to blue-green version pointers.
#[derive(Clone)]
pub struct VersionPointers {
    store: SharedCoordinationStore,
}

impl VersionPointers {
    pub fn new(store: SharedCoordinationStore) -> Self {
        Self { store }
    }

    /// Current version, 0 when the document has never been versioned.
    pub async fn current(&self, document_id: &str) -> Result<u64, StrategyError> {
        match self.store.get(&version_key(document_id)).await? {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
                StrategyError::Serialization(format!(
                    "bad version pointer for {document_id}: {e}"
                ))
            }),
            None => Ok(0),
        }
    }

    pub async fn set(&self, document_id: &str, version: u64) -> Result<(), StrategyError> {
        self.store
            .set(&version_key(document_id), &version.to_string(), None)
            .await?;
        Ok(())
    }

    pub async fn clear(&self, document_id: &str) -> Result<bool, StrategyError> {
        Ok(self.store.del(&version_key(document_id)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reindex_storage::MemoryCoordinationStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_marker_lifecycle() {
        let markers = InProgressMarkers::new(Arc::new(MemoryCoordinationStore::new()));
        let marker = InProgressMarker::new("DOC-1", 5_000).with_versions(1, 2);

        markers.begin("doc-1", &marker).await.unwrap();
        assert_eq!(markers.get("doc-1").await.unwrap(), Some(marker));
        assert_eq!(markers.all_raw().await.unwrap().len(), 1);

        assert!(markers.clear("doc-1").await.unwrap());
        assert!(!markers.clear("doc-1").await.unwrap());
        assert_eq!(markers.get("doc-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_version_pointer_defaults_to_zero() {
        let store: SharedCoordinationStore = Arc::new(MemoryCoordinationStore::new());
        let versions = VersionPointers::new(store.clone());

        assert_eq!(versions.current("doc-1").await.unwrap(), 0);
        versions.set("doc-1", 4).await.unwrap();
        assert_eq!(versions.current("doc-1").await.unwrap(), 4);
        assert_eq!(
            store.get("version:doc-1").await.unwrap(),
            Some("4".to_string())
        );

        assert!(versions.clear("doc-1").await.unwrap());
        assert_eq!(versions.current("doc-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_version_pointer_is_an_error() {
        let store: SharedCoordinationStore = Arc::new(MemoryCoordinationStore::new());
        store.set("version:doc-1", "abc", None).await.unwrap();
        let versions = VersionPointers::new(store);
        assert!(matches!(
            versions.current("doc-1").await,
            Err(StrategyError::Serialization(_))
        ));
    }
}
