//! Operator actions for repairing a single document or lock.

use std::fmt;
use std::str::FromStr;

use reindex_storage::keys::lock_key;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::RecoveryError;
use crate::service::RecoveryService;

/// What to do with a stuck document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanupAction {
    /// Delete the marker only.
    ClearStatus,
    /// Delete the marker and purge every chunk of the document.
    ForceDelete,
}

impl CleanupAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupAction::ClearStatus => "clear-status",
            CleanupAction::ForceDelete => "force-delete",
        }
    }
}

impl fmt::Display for CleanupAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CleanupAction {
    type Err = RecoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "clear-status" => Ok(CleanupAction::ClearStatus),
            "force-delete" => Ok(CleanupAction::ForceDelete),
            _ => Err(RecoveryError::UnknownAction(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResult {
    pub document_id: String,
    pub action: CleanupAction,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionCleanupResult {
    pub document_id: String,
    pub kept_version: u64,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockReleaseResult {
    pub document_id: String,
    pub released: bool,
}

impl RecoveryService {
    pub async fn cleanup_stuck_document(
        &self,
        document_id: &str,
        action: CleanupAction,
    ) -> Result<CleanupResult, RecoveryError> {
        self.markers.clear(document_id).await?;
        if action == CleanupAction::ForceDelete {
            self.repository.delete_by_document(document_id).await?;
        }
        info!(document_id = %document_id, action = %action, "Cleaned up stuck document");
        Ok(CleanupResult {
            document_id: document_id.to_string(),
            action,
            success: true,
        })
    }

    /// Keep only the chunks tagged `keep_version` and clear any marker.
    pub async fn cleanup_incomplete_versions(
        &self,
        document_id: &str,
        keep_version: u64,
    ) -> Result<VersionCleanupResult, RecoveryError> {
        self.repository
            .delete_by_document_except_version(document_id, keep_version)
            .await?;
        self.markers.clear(document_id).await?;
        info!(document_id = %document_id, keep_version, "Removed stray versions");
        Ok(VersionCleanupResult {
            document_id: document_id.to_string(),
            kept_version: keep_version,
            success: true,
        })
    }

    /// Delete the lock whoever holds it.
    pub async fn force_release_lock(
        &self,
        document_id: &str,
    ) -> Result<LockReleaseResult, RecoveryError> {
        let released = self.coordination.del(&lock_key(document_id)).await?;
        info!(document_id = %document_id, released, "Force-released lock");
        Ok(LockReleaseResult {
            document_id: document_id.to_string(),
            released,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::{chunk, service, START};
    use reindex_types::{ChunkPayload, ChunkRecord, InProgressMarker};

    #[test]
    fn test_action_names() {
        assert_eq!(
            "force_delete".parse::<CleanupAction>().unwrap(),
            CleanupAction::ForceDelete
        );
        assert_eq!(
            "clear-status".parse::<CleanupAction>().unwrap(),
            CleanupAction::ClearStatus
        );
        assert!("wipe".parse::<CleanupAction>().is_err());
        assert_eq!(
            serde_json::to_string(&CleanupAction::ClearStatus).unwrap(),
            "\"clear-status\""
        );
    }

    #[tokio::test]
    async fn test_clear_status_keeps_chunks() {
        let (service, _clock) = service();
        service.repository.upsert(vec![chunk("doc", 0, 1)]).await.unwrap();
        service
            .markers
            .begin("doc", &InProgressMarker::new("DOC", START))
            .await
            .unwrap();

        let result = service
            .cleanup_stuck_document("doc", CleanupAction::ClearStatus)
            .await
            .unwrap();
        assert!(result.success);
        assert!(service.markers.get("doc").await.unwrap().is_none());
        assert_eq!(
            service.repository.chunks_for_document("doc").await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_force_delete_purges_chunks() {
        let (service, _clock) = service();
        service
            .repository
            .upsert(vec![chunk("doc", 0, 1), chunk("other", 0, 1)])
            .await
            .unwrap();
        service
            .markers
            .begin("doc", &InProgressMarker::new("DOC", START))
            .await
            .unwrap();

        service
            .cleanup_stuck_document("doc", CleanupAction::ForceDelete)
            .await
            .unwrap();
        assert!(service
            .repository
            .chunks_for_document("doc")
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            service.repository.chunks_for_document("other").await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_cleanup_versions_keeps_exactly_one_generation() {
        let (service, _clock) = service();
        let untagged = ChunkRecord::new(
            "untagged",
            vec![0.0, 1.0, 0.0, 0.0],
            ChunkPayload::new("doc", "doc", 0, "legacy", START),
        );
        service
            .repository
            .upsert(vec![
                chunk("doc", 0, 1),
                chunk("doc", 1, 1),
                chunk("doc", 0, 2),
                chunk("doc", 0, 3),
                untagged,
            ])
            .await
            .unwrap();
        service
            .markers
            .begin("doc", &InProgressMarker::new("DOC", START).with_versions(1, 2))
            .await
            .unwrap();

        let result = service.cleanup_incomplete_versions("doc", 2).await.unwrap();
        assert_eq!(result.kept_version, 2);

        let remaining = service.repository.chunks_for_document("doc").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining.iter().all(|c| c.version == Some(2)));
        assert!(service.markers.get("doc").await.unwrap().is_none());
        assert!(service.find_incomplete_versions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_force_release_lock() {
        let (service, _clock) = service();
        service.coordination.set("lock:doc", "{}", None).await.unwrap();

        assert!(service.force_release_lock("doc").await.unwrap().released);
        assert!(!service.force_release_lock("doc").await.unwrap().released);
    }
}
