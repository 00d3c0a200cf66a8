//! Ephemeral coordination records: in-progress markers and lock records.

use serde::{Deserialize, Serialize};

/// Announces that a reindex of a document is underway.
///
/// Owned by the strategy that is mid-reindex and removed on success. A
/// marker that outlives the stuck threshold is taken as evidence of a crash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InProgressMarker {
    pub document_number: String,
    pub started_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_version: Option<u64>,
}

impl InProgressMarker {
    pub fn new(document_number: impl Into<String>, started_at: i64) -> Self {
        Self {
            document_number: document_number.into(),
            started_at,
            retry_count: None,
            from_version: None,
            to_version: None,
        }
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }

    pub fn with_versions(mut self, from_version: u64, to_version: u64) -> Self {
        self.from_version = Some(from_version);
        self.to_version = Some(to_version);
        self
    }

    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.started_at
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Value stored under a document's lock key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub locked_at: i64,
    /// Identity of the holder (process id based)
    pub holder: String,
}

impl LockRecord {
    pub fn new(locked_at: i64, holder: impl Into<String>) -> Self {
        Self {
            locked_at,
            holder: holder.into(),
        }
    }

    /// Lock record held by the current process.
    pub fn for_current_process(locked_at: i64) -> Self {
        Self::new(locked_at, format!("pid-{}", std::process::id()))
    }

    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.locked_at
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_json_format() {
        let marker = InProgressMarker::new("DOC-7", 1_000).with_versions(2, 3);
        let json = marker.to_json().unwrap();
        assert!(json.contains("\"documentNumber\":\"DOC-7\""));
        assert!(json.contains("\"startedAt\":1000"));
        assert!(json.contains("\"fromVersion\":2"));
        assert!(json.contains("\"toVersion\":3"));
        assert!(!json.contains("retryCount"));
        assert_eq!(marker.age_ms(4_000), 3_000);
    }

    #[test]
    fn test_lock_record_holder() {
        let record = LockRecord::for_current_process(500);
        assert!(record.holder.starts_with("pid-"));
        let decoded = LockRecord::from_json(&record.to_json().unwrap()).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.age_ms(1_500), 1_000);
    }
}
