//! Reindex job type for the priority queue.
//!
//! Jobs are stored as JSON snapshots in the coordination store. The queue
//! orders them by [`ReindexJob::score`]: priority-major, FIFO-minor.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Weight applied to the priority in the queue score.
///
/// Larger than any millisecond timestamp before the year 2286, so priority
/// always dominates `created_at`.
pub const PRIORITY_SCORE_WEIGHT: i64 = 10_000_000_000_000;

/// Queue priority; lower is more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Priority {
    Critical = 1,
    High = 2,
    Normal = 3,
    Low = 4,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.as_u8()
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Priority::Critical),
            2 => Ok(Priority::High),
            3 => Ok(Priority::Normal),
            4 => Ok(Priority::Low),
            other => Err(format!("priority must be 1-4, got {}", other)),
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    /// Accepts either the level name or its number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" | "1" => Ok(Priority::Critical),
            "high" | "2" => Ok(Priority::High),
            "normal" | "3" => Ok(Priority::Normal),
            "low" | "4" => Ok(Priority::Low),
            other => Err(format!(
                "unknown priority '{}' (expected critical, high, normal or low)",
                other
            )),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle status of a job snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Completed and failed jobs are terminal and eligible for cleanup.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// A unit of queued reindex work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReindexJob {
    pub document_id: String,
    pub document_number: String,
    pub priority: Priority,
    /// Free-text diagnostic reason
    pub reason: String,
    /// Ordering timestamp (ms since epoch)
    pub created_at: i64,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_bumped_at: Option<i64>,
}

impl ReindexJob {
    pub fn new(
        document_id: impl Into<String>,
        document_number: impl Into<String>,
        priority: Priority,
        reason: impl Into<String>,
        created_at: i64,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            document_number: document_number.into(),
            priority,
            reason: reason.into(),
            created_at,
            retry_count: 0,
            original_error: None,
            status: None,
            queued_at: None,
            started_at: None,
            completed_at: None,
            error: None,
            priority_bumped_at: None,
        }
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_original_error(mut self, error: impl Into<String>) -> Self {
        self.original_error = Some(error.into());
        self
    }

    /// Queue score: `priority * PRIORITY_SCORE_WEIGHT + created_at`.
    pub fn score(&self) -> i64 {
        Self::score_for(self.priority, self.created_at)
    }

    pub fn score_for(priority: Priority, created_at: i64) -> i64 {
        i64::from(priority.as_u8()) * PRIORITY_SCORE_WEIGHT + created_at
    }

    pub fn is_status(&self, status: JobStatus) -> bool {
        self.status == Some(status)
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
    fn test_priority_dominates_timestamp() {
        let urgent_late = ReindexJob::new("a", "A", Priority::Critical, "r", 4_000_000_000_000);
        let lazy_early = ReindexJob::new("b", "B", Priority::Low, "r", 0);
        assert!(urgent_late.score() < lazy_early.score());
    }

    #[test]
    fn test_fifo_within_priority() {
        let first = ReindexJob::new("a", "A", Priority::Normal, "r", 100);
        let second = ReindexJob::new("b", "B", Priority::Normal, "r", 200);
        assert!(first.score() < second.score());
    }

    #[test]
    fn test_priority_serializes_as_number() {
        let job = ReindexJob::new("doc", "DOC", Priority::High, "edit", 42);
        let json = job.to_json().unwrap();
        assert!(json.contains("\"priority\":2"));
        assert!(json.contains("\"documentId\":\"doc\""));
        assert!(json.contains("\"retryCount\":0"));

        let decoded = ReindexJob::from_json(&json).unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn test_priority_rejects_out_of_range() {
        let err = serde_json::from_str::<Priority>("7").unwrap_err();
        assert!(err.to_string().contains("priority must be 1-4"));
    }

    #[test]
    fn test_priority_from_str() {
        assert_eq!("critical".parse::<Priority>().unwrap(), Priority::Critical);
        assert_eq!("4".parse::<Priority>().unwrap(), Priority::Low);
        assert_eq!(" High ".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_missing_retry_count_defaults_to_zero() {
        let json = r#"{"documentId":"d","documentNumber":"D","priority":3,"reason":"r","createdAt":1}"#;
        let job = ReindexJob::from_json(json).unwrap();
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.status, None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }
}
