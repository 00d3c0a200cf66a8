//! Records reported by recovery scans.

use serde::{Deserialize, Serialize};

const MS_PER_MINUTE: f64 = 60_000.0;

/// Whole minutes, rounded to nearest.
fn rounded_minutes(duration_ms: i64) -> i64 {
    (duration_ms as f64 / MS_PER_MINUTE).round() as i64
}

/// A document whose in-progress marker has outlived the stuck threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StuckDocument {
    pub document_id: String,
    pub document_number: String,
    pub started_at: i64,
    pub stuck_duration_ms: i64,
    pub stuck_duration_minutes: i64,
}

impl StuckDocument {
    pub fn new(
        document_id: impl Into<String>,
        document_number: impl Into<String>,
        started_at: i64,
        stuck_duration_ms: i64,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            document_number: document_number.into(),
            started_at,
            stuck_duration_ms,
            stuck_duration_minutes: rounded_minutes(stuck_duration_ms),
        }
    }
}

/// A lock record older than the stuck-lock threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StuckLock {
    pub document_id: String,
    pub locked_at: i64,
    pub lock_duration_ms: i64,
    pub lock_duration_minutes: i64,
    /// Remaining TTL in seconds; 0 once expired, -1 when the key has no TTL
    pub ttl_seconds: i64,
}

impl StuckLock {
    pub fn new(
        document_id: impl Into<String>,
        locked_at: i64,
        lock_duration_ms: i64,
        ttl_seconds: i64,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            locked_at,
            lock_duration_ms,
            lock_duration_minutes: rounded_minutes(lock_duration_ms),
            ttl_seconds,
        }
    }
}

/// A document whose chunks carry more than one distinct version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncompleteVersion {
    pub document_id: String,
    /// Distinct versions, ascending
    pub versions: Vec<u64>,
    pub version_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minutes_are_rounded() {
        let doc = StuckDocument::new("d", "D", 0, 6 * 60_000 + 31_000);
        assert_eq!(doc.stuck_duration_minutes, 7);

        let lock = StuckLock::new("d", 0, 10 * 60_000 + 29_000, 0);
        assert_eq!(lock.lock_duration_minutes, 10);
    }
}
