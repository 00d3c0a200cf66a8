//! In-process vector store.
//!
//! Brute-force cosine search over a map of records. Every call yields to the
//! runtime before touching state, so concurrent searches can observe the
//! intermediate states of a reindex exactly as they would against a remote
//! store.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use reindex_embeddings::cosine_similarity;
use reindex_types::{ChunkRecord, ScoredChunk};

use crate::error::VectorError;
use crate::filter::Filter;
use crate::store::VectorStore;

/// In-memory [`VectorStore`].
#[derive(Debug)]
pub struct InMemoryVectorStore {
    dimension: usize,
    records: RwLock<BTreeMap<String, ChunkRecord>>,
}

impl InMemoryVectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    async fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, ChunkRecord>>, VectorError> {
        tokio::task::yield_now().await;
        self.records.read().map_err(|_| VectorError::Poisoned)
    }

    async fn write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, BTreeMap<String, ChunkRecord>>, VectorError> {
        tokio::task::yield_now().await;
        self.records.write().map_err(|_| VectorError::Poisoned)
    }
}

fn matches(filter: Option<&Filter>, record: &ChunkRecord) -> Result<bool, VectorError> {
    match filter {
        None => Ok(true),
        Some(filter) => Ok(filter.matches(&serde_json::to_value(&record.payload)?)),
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_collection(&self) -> Result<(), VectorError> {
        Ok(())
    }

    async fn reset(&self) -> Result<(), VectorError> {
        self.write().await?.clear();
        Ok(())
    }

    async fn upsert(&self, records: Vec<ChunkRecord>) -> Result<(), VectorError> {
        if let Some(bad) = records.iter().find(|r| r.vector.len() != self.dimension) {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.vector.len(),
            });
        }
        let mut map = self.write().await?;
        for record in records {
            map.insert(record.id.clone(), record);
        }
        Ok(())
    }

    async fn delete_by_filter(&self, filter: &Filter) -> Result<(), VectorError> {
        let mut map = self.write().await?;
        let doomed = map
            .values()
            .filter_map(|r| match matches(Some(filter), r) {
                Ok(true) => Some(Ok(r.id.clone())),
                Ok(false) => None,
                Err(e) => Some(Err(e)),
            })
            .collect::<Result<Vec<_>, _>>()?;
        for id in doomed {
            map.remove(&id);
        }
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredChunk>, VectorError> {
        if vector.len() != self.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        let map = self.read().await?;
        let mut hits = Vec::new();
        for record in map.values() {
            if matches(filter, record)? {
                hits.push(ScoredChunk {
                    id: record.id.clone(),
                    score: cosine_similarity(vector, &record.vector),
                    payload: record.payload.clone(),
                });
            }
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn scroll(
        &self,
        filter: Option<&Filter>,
        with_vector: bool,
    ) -> Result<Vec<ChunkRecord>, VectorError> {
        let map = self.read().await?;
        let mut out = Vec::new();
        for record in map.values() {
            if matches(filter, record)? {
                let mut record = record.clone();
                if !with_vector {
                    record.vector.clear();
                }
                out.push(record);
            }
        }
        Ok(out)
    }

    async fn count(&self, filter: Option<&Filter>) -> Result<usize, VectorError> {
        let map = self.read().await?;
        let mut n = 0;
        for record in map.values() {
            if matches(filter, record)? {
                n += 1;
            }
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Condition;
    use reindex_types::{fields, ChunkPayload, ChunkStatus};

    fn record(id: &str, doc: &str, vector: Vec<f32>, status: ChunkStatus) -> ChunkRecord {
        ChunkRecord::new(
            id,
            vector,
            ChunkPayload::new(doc, doc, 0, format!("content of {}", id), 1).with_status(status),
        )
    }

    #[tokio::test]
    async fn test_search_ranks_by_similarity() {
        let store = InMemoryVectorStore::new(2);
        store
            .upsert(vec![
                record("a", "d1", vec![1.0, 0.0], ChunkStatus::Active),
                record("b", "d2", vec![0.0, 1.0], ChunkStatus::Active),
                record("c", "d3", vec![0.7, 0.7], ChunkStatus::Inactive),
            ])
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.1], 10, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);

        let active = Filter::new().must(Condition::equals(fields::STATUS, "active"));
        let hits = store.search(&[1.0, 0.1], 1, Some(&active)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[tokio::test]
    async fn test_delete_by_filter_and_count() {
        let store = InMemoryVectorStore::new(2);
        store
            .upsert(vec![
                record("a", "d1", vec![1.0, 0.0], ChunkStatus::Active),
                record("b", "d1", vec![0.0, 1.0], ChunkStatus::Active),
                record("c", "d2", vec![0.5, 0.5], ChunkStatus::Active),
            ])
            .await
            .unwrap();

        let d1 = Filter::new().must(Condition::equals(fields::DOCUMENT_ID, "d1"));
        assert_eq!(store.count(Some(&d1)).await.unwrap(), 2);
        store.delete_by_filter(&d1).await.unwrap();
        assert_eq!(store.count(Some(&d1)).await.unwrap(), 0);
        assert_eq!(store.count(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_scroll_strips_vectors_unless_requested() {
        let store = InMemoryVectorStore::new(2);
        store
            .upsert(vec![record("a", "d1", vec![1.0, 0.0], ChunkStatus::Active)])
            .await
            .unwrap();

        assert!(store.scroll(None, false).await.unwrap()[0].vector.is_empty());
        assert_eq!(store.scroll(None, true).await.unwrap()[0].vector, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_dimension_checked() {
        let store = InMemoryVectorStore::new(3);
        let err = store
            .upsert(vec![record("a", "d1", vec![1.0], ChunkStatus::Active)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VectorError::DimensionMismatch {
                expected: 3,
                actual: 1
            }
        ));
        assert!(store.search(&[1.0], 5, None).await.is_err());
    }

    #[tokio::test]
    async fn test_reset_clears() {
        let store = InMemoryVectorStore::new(2);
        store
            .upsert(vec![record("a", "d1", vec![1.0, 0.0], ChunkStatus::Active)])
            .await
            .unwrap();
        store.reset().await.unwrap();
        assert_eq!(store.count(None).await.unwrap(), 0);
    }
}
