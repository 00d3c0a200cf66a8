//! Document-level operations over a [`VectorStore`].
//!
//! Strategies, recovery and diagnostics address chunks by document. This
//! module owns the filters for those access patterns.

use std::collections::{BTreeMap, BTreeSet};

use reindex_types::{fields, ChunkPayload, ChunkRecord, ChunkStatus, ScoredChunk, SharedClock};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::VectorError;
use crate::filter::{Condition, Filter, Range};
use crate::store::SharedVectorStore;

/// Chunk count per document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChunkCount {
    pub document_id: String,
    pub chunk_count: usize,
}

/// Collection-wide status tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
}

/// Per-document status tally; `unknown` covers untagged and pending chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStatusCounts {
    pub active: usize,
    pub inactive: usize,
    pub unknown: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedAtRange {
    pub min: i64,
    pub max: i64,
}

/// What the store holds for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub document_id: String,
    pub chunk_count: usize,
    pub status_counts: DocumentStatusCounts,
    /// Distinct versions, ascending
    pub versions: Vec<u64>,
    pub created_at_range: Option<CreatedAtRange>,
}

/// Filter selecting every chunk of a document.
pub fn document_filter(document_id: &str) -> Filter {
    Filter::new().must(Condition::equals(fields::DOCUMENT_ID, document_id))
}

/// Filter selecting searchable chunks.
pub fn active_filter() -> Filter {
    Filter::new().must(Condition::equals(fields::STATUS, ChunkStatus::Active.as_str()))
}

/// Chunk access keyed by document id.
#[derive(Clone)]
pub struct ChunkRepository {
    store: SharedVectorStore,
    clock: SharedClock,
}

impl ChunkRepository {
    pub fn new(store: SharedVectorStore, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &SharedVectorStore {
        &self.store
    }

    pub async fn upsert(&self, records: Vec<ChunkRecord>) -> Result<(), VectorError> {
        self.store.upsert(records).await
    }

    pub async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredChunk>, VectorError> {
        self.store.search(vector, limit, filter).await
    }

    pub async fn delete_by_document(&self, document_id: &str) -> Result<(), VectorError> {
        self.store
            .delete_by_filter(&document_filter(document_id))
            .await
    }

    pub async fn delete_by_document_and_version(
        &self,
        document_id: &str,
        version: u64,
    ) -> Result<(), VectorError> {
        let filter =
            document_filter(document_id).must(Condition::equals(fields::VERSION, version));
        self.store.delete_by_filter(&filter).await
    }

    /// Delete every chunk of the document whose version differs from `keep_version`.
    pub async fn delete_by_document_except_version(
        &self,
        document_id: &str,
        keep_version: u64,
    ) -> Result<(), VectorError> {
        let filter =
            document_filter(document_id).must_not(Condition::equals(fields::VERSION, keep_version));
        self.store.delete_by_filter(&filter).await
    }

    /// Retire every active chunk of the document. Returns how many were retired.
    pub async fn mark_inactive(&self, document_id: &str) -> Result<usize, VectorError> {
        let filter = document_filter(document_id)
            .must(Condition::equals(fields::STATUS, ChunkStatus::Active.as_str()));
        self.retire_matching(&filter).await
    }

    /// Retire active chunks of the document created strictly before `cutoff_ms`.
    pub async fn mark_inactive_older_than(
        &self,
        document_id: &str,
        cutoff_ms: i64,
    ) -> Result<usize, VectorError> {
        let filter = document_filter(document_id)
            .must(Condition::equals(fields::STATUS, ChunkStatus::Active.as_str()))
            .must(Condition::range(
                fields::CREATED_AT,
                Range::less_than(cutoff_ms as f64),
            ));
        self.retire_matching(&filter).await
    }

    async fn retire_matching(&self, filter: &Filter) -> Result<usize, VectorError> {
        let records = self.store.scroll(Some(filter), true).await?;
        if records.is_empty() {
            return Ok(0);
        }
        let now = self.clock.now_ms();
        let retired: Vec<ChunkRecord> = records
            .into_iter()
            .map(|mut r| {
                r.payload.status = Some(ChunkStatus::Inactive);
                r.payload.updated_at = Some(now);
                r
            })
            .collect();
        let count = retired.len();
        self.store.upsert(retired).await?;
        debug!(count, "Retired chunks");
        Ok(count)
    }

    /// Payloads of a document, ordered by creation time then chunk index.
    pub async fn chunks_for_document(
        &self,
        document_id: &str,
    ) -> Result<Vec<ChunkPayload>, VectorError> {
        let mut payloads: Vec<ChunkPayload> = self
            .store
            .scroll(Some(&document_filter(document_id)), false)
            .await?
            .into_iter()
            .map(|r| r.payload)
            .collect();
        payloads.sort_by_key(|p| (p.created_at, p.chunk_index));
        Ok(payloads)
    }

    /// Every document with chunks, ordered by id.
    pub async fn all_documents(&self) -> Result<Vec<DocumentChunkCount>, VectorError> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for record in self.store.scroll(None, false).await? {
            *counts.entry(record.payload.document_id).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(document_id, chunk_count)| DocumentChunkCount {
                document_id,
                chunk_count,
            })
            .collect())
    }

    pub async fn status_counts(&self) -> Result<StatusCounts, VectorError> {
        let total = self.store.count(None).await?;
        let active = self.store.count(Some(&active_filter())).await?;
        let inactive_filter = Filter::new().must(Condition::equals(
            fields::STATUS,
            ChunkStatus::Inactive.as_str(),
        ));
        let inactive = self.store.count(Some(&inactive_filter)).await?;
        Ok(StatusCounts {
            total,
            active,
            inactive,
        })
    }

    pub async fn document_summary(&self, document_id: &str) -> Result<DocumentSummary, VectorError> {
        let records = self
            .store
            .scroll(Some(&document_filter(document_id)), false)
            .await?;

        let mut status_counts = DocumentStatusCounts::default();
        let mut versions = BTreeSet::new();
        let mut range: Option<CreatedAtRange> = None;

        for record in &records {
            let payload = &record.payload;
            match payload.status {
                Some(ChunkStatus::Active) => status_counts.active += 1,
                Some(ChunkStatus::Inactive) => status_counts.inactive += 1,
                _ => status_counts.unknown += 1,
            }
            if let Some(version) = payload.version {
                versions.insert(version);
            }
            range = Some(match range {
                None => CreatedAtRange {
                    min: payload.created_at,
                    max: payload.created_at,
                },
                Some(r) => CreatedAtRange {
                    min: r.min.min(payload.created_at),
                    max: r.max.max(payload.created_at),
                },
            });
        }

        Ok(DocumentSummary {
            document_id: document_id.to_string(),
            chunk_count: records.len(),
            status_counts,
            versions: versions.into_iter().collect(),
            created_at_range: range,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryVectorStore;
    use reindex_types::ManualClock;
    use std::sync::Arc;

    fn repo() -> (ChunkRepository, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(10_000));
        let store = Arc::new(InMemoryVectorStore::new(2));
        (ChunkRepository::new(store, clock.clone()), clock)
    }

    trait Tag {
        fn with_version(self, version: u64) -> Self;
        fn with_status(self, status: ChunkStatus) -> Self;
    }

    impl Tag for ChunkRecord {
        fn with_version(mut self, version: u64) -> Self {
            self.payload = self.payload.with_version(version);
            self
        }

        fn with_status(mut self, status: ChunkStatus) -> Self {
            self.payload = self.payload.with_status(status);
            self
        }
    }

    fn chunk(id: &str, doc: &str, index: usize, created_at: i64) -> ChunkRecord {
        ChunkRecord::new(
            id,
            vec![1.0, 0.0],
            ChunkPayload::new(doc, doc, index, "text", created_at),
        )
    }

    #[tokio::test]
    async fn test_version_scoped_deletes() {
        let (repo, _) = repo();
        repo.upsert(vec![
            chunk("a", "d", 0, 1).with_version(1),
            chunk("b", "d", 0, 2).with_version(2),
            chunk("c", "d", 1, 2).with_version(2),
            chunk("e", "other", 0, 1).with_version(1),
        ])
        .await
        .unwrap();

        repo.delete_by_document_and_version("d", 1).await.unwrap();
        assert_eq!(repo.document_summary("d").await.unwrap().versions, vec![2]);
        assert_eq!(repo.document_summary("other").await.unwrap().chunk_count, 1);

        repo.upsert(vec![chunk("f", "d", 0, 3).with_version(3)])
            .await
            .unwrap();
        repo.delete_by_document_except_version("d", 3).await.unwrap();
        let summary = repo.document_summary("d").await.unwrap();
        assert_eq!(summary.versions, vec![3]);
        assert_eq!(summary.chunk_count, 1);

        repo.delete_by_document("d").await.unwrap();
        assert_eq!(repo.document_summary("d").await.unwrap().chunk_count, 0);
    }

    #[tokio::test]
    async fn test_mark_inactive_older_than_spares_new_chunks() {
        let (repo, clock) = repo();
        repo.upsert(vec![
            chunk("old", "d", 0, 100).with_status(ChunkStatus::Active),
            chunk("new", "d", 0, 200).with_status(ChunkStatus::Active),
        ])
        .await
        .unwrap();

        clock.set(55_555);
        let retired = repo.mark_inactive_older_than("d", 200).await.unwrap();
        assert_eq!(retired, 1);

        let chunks = repo.chunks_for_document("d").await.unwrap();
        assert_eq!(chunks[0].status, Some(ChunkStatus::Inactive));
        assert_eq!(chunks[0].updated_at, Some(55_555));
        assert_eq!(chunks[1].status, Some(ChunkStatus::Active));

        let counts = repo.status_counts().await.unwrap();
        assert_eq!(
            counts,
            StatusCounts {
                total: 2,
                active: 1,
                inactive: 1
            }
        );
    }

    #[tokio::test]
    async fn test_retired_chunks_keep_their_vectors() {
        let (repo, _) = repo();
        repo.upsert(vec![chunk("a", "d", 0, 1).with_status(ChunkStatus::Active)])
            .await
            .unwrap();
        assert_eq!(repo.mark_inactive("d").await.unwrap(), 1);
        assert_eq!(repo.mark_inactive("d").await.unwrap(), 0);

        let records = repo.store().scroll(None, true).await.unwrap();
        assert_eq!(records[0].vector, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_summary_and_document_listing() {
        let (repo, _) = repo();
        repo.upsert(vec![
            chunk("a", "d1", 0, 5).with_status(ChunkStatus::Active),
            chunk("b", "d1", 1, 9),
            chunk("c", "d2", 0, 7),
        ])
        .await
        .unwrap();

        let docs = repo.all_documents().await.unwrap();
        assert_eq!(
            docs,
            vec![
                DocumentChunkCount {
                    document_id: "d1".to_string(),
                    chunk_count: 2
                },
                DocumentChunkCount {
                    document_id: "d2".to_string(),
                    chunk_count: 1
                },
            ]
        );

        let summary = repo.document_summary("d1").await.unwrap();
        assert_eq!(summary.status_counts.active, 1);
        assert_eq!(summary.status_counts.unknown, 1);
        assert_eq!(
            summary.created_at_range,
            Some(CreatedAtRange { min: 5, max: 9 })
        );
        assert!(repo.document_summary("missing").await.unwrap().created_at_range.is_none());
    }
}
