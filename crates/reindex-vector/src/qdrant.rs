//! Qdrant REST client.
//!
//! Talks to a single collection with cosine distance. Writes use
//! `wait=true` so a successful return means the points are searchable.

use std::time::Duration;

use async_trait::async_trait;
use reindex_types::{ChunkPayload, ChunkRecord, ScoredChunk, VectorStoreConfig};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::VectorError;
use crate::filter::Filter;
use crate::store::VectorStore;

/// Points fetched per scroll page.
const SCROLL_PAGE_SIZE: usize = 1000;

/// Configuration for the Qdrant client.
#[derive(Debug, Clone)]
pub struct QdrantConfig {
    /// Base URL (e.g., "http://localhost:6333")
    pub url: String,

    pub collection: String,

    pub vector_size: usize,

    /// API key sent as the `api-key` header
    pub api_key: Option<SecretString>,

    /// Request timeout
    pub timeout: Duration,
}

impl QdrantConfig {
    pub fn new(url: impl Into<String>, collection: impl Into<String>, vector_size: usize) -> Self {
        Self {
            url: url.into(),
            collection: collection.into(),
            vector_size,
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl From<&VectorStoreConfig> for QdrantConfig {
    fn from(settings: &VectorStoreConfig) -> Self {
        let mut config = Self::new(
            settings.url.trim_end_matches('/'),
            settings.collection.clone(),
            settings.vector_size,
        );
        config.api_key = settings.api_key.clone().map(SecretString::from);
        config
    }
}

#[derive(Serialize)]
struct PointOut<'a> {
    id: &'a str,
    vector: &'a [f32],
    payload: &'a ChunkPayload,
}

#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct ScoredPointIn {
    id: Value,
    score: f32,
    payload: ChunkPayload,
}

#[derive(Deserialize)]
struct PointIn {
    id: Value,
    #[serde(default)]
    vector: Option<Vec<f32>>,
    payload: ChunkPayload,
}

#[derive(Deserialize)]
struct ScrollPage {
    points: Vec<PointIn>,
    #[serde(default)]
    next_page_offset: Option<Value>,
}

#[derive(Deserialize)]
struct CountResult {
    count: usize,
}

/// Point ids come back as UUID strings or integers.
fn id_to_string(id: Value) -> String {
    match id {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn search_body(vector: &[f32], limit: usize, filter: Option<&Filter>) -> Value {
    let mut body = json!({
        "vector": vector,
        "limit": limit,
        "with_payload": true,
    });
    if let Some(filter) = filter {
        body["filter"] = json!(filter);
    }
    body
}

fn scroll_body(filter: Option<&Filter>, with_vector: bool, offset: Option<&Value>) -> Value {
    let mut body = json!({
        "limit": SCROLL_PAGE_SIZE,
        "with_payload": true,
        "with_vector": with_vector,
    });
    if let Some(filter) = filter {
        body["filter"] = json!(filter);
    }
    if let Some(offset) = offset {
        body["offset"] = offset.clone();
    }
    body
}

/// [`VectorStore`] backed by a Qdrant collection.
pub struct QdrantVectorStore {
    client: Client,
    config: QdrantConfig,
}

impl QdrantVectorStore {
    pub fn new(config: QdrantConfig) -> Result<Self, VectorError> {
        if config.vector_size == 0 {
            return Err(VectorError::Config("vector_size must be > 0".to_string()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| VectorError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!(
            "{}/collections/{}{}",
            self.config.url, self.config.collection, suffix
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header("Content-Type", "application/json");
        match &self.config.api_key {
            Some(key) => builder.header("api-key", key.expose_secret()),
            None => builder,
        }
    }

    /// Send and fail on any non-success status except those in `allowed`.
    async fn send(
        &self,
        builder: RequestBuilder,
        allowed: &[StatusCode],
    ) -> Result<reqwest::Response, VectorError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() && !allowed.contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(VectorError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn create_collection(&self) -> Result<(), VectorError> {
        let url = self.collection_url("");
        let body = json!({
            "vectors": { "size": self.config.vector_size, "distance": "Cosine" }
        });
        self.send(self.request(Method::PUT, &url).json(&body), &[])
            .await?;
        info!(collection = %self.config.collection, "Created collection");
        Ok(())
    }

    async fn scroll_page(
        &self,
        filter: Option<&Filter>,
        with_vector: bool,
        offset: Option<&Value>,
    ) -> Result<ScrollPage, VectorError> {
        let url = self.collection_url("/points/scroll");
        let body = scroll_body(filter, with_vector, offset);
        let response = self
            .send(self.request(Method::POST, &url).json(&body), &[])
            .await?;
        let envelope: Envelope<ScrollPage> = response.json().await?;
        Ok(envelope.result)
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn ensure_collection(&self) -> Result<(), VectorError> {
        let url = self.collection_url("");
        let response = self
            .send(self.request(Method::GET, &url), &[StatusCode::NOT_FOUND])
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            self.create_collection().await?;
        }
        Ok(())
    }

    async fn reset(&self) -> Result<(), VectorError> {
        let url = self.collection_url("");
        self.send(self.request(Method::DELETE, &url), &[StatusCode::NOT_FOUND])
            .await?;
        self.create_collection().await?;
        info!(collection = %self.config.collection, "Reset collection");
        Ok(())
    }

    async fn upsert(&self, records: Vec<ChunkRecord>) -> Result<(), VectorError> {
        if records.is_empty() {
            return Ok(());
        }
        let points: Vec<PointOut<'_>> = records
            .iter()
            .map(|r| PointOut {
                id: &r.id,
                vector: &r.vector,
                payload: &r.payload,
            })
            .collect();
        let url = self.collection_url("/points?wait=true");
        self.send(
            self.request(Method::PUT, &url)
                .json(&json!({ "points": points })),
            &[],
        )
        .await?;
        debug!(count = records.len(), "Upserted points");
        Ok(())
    }

    async fn delete_by_filter(&self, filter: &Filter) -> Result<(), VectorError> {
        let url = self.collection_url("/points/delete?wait=true");
        self.send(
            self.request(Method::POST, &url)
                .json(&json!({ "filter": filter })),
            &[],
        )
        .await?;
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredChunk>, VectorError> {
        let url = self.collection_url("/points/search");
        let body = search_body(vector, limit, filter);
        let response = self
            .send(self.request(Method::POST, &url).json(&body), &[])
            .await?;
        let envelope: Envelope<Vec<ScoredPointIn>> = response.json().await?;
        Ok(envelope
            .result
            .into_iter()
            .map(|p| ScoredChunk {
                id: id_to_string(p.id),
                score: p.score,
                payload: p.payload,
            })
            .collect())
    }

    async fn scroll(
        &self,
        filter: Option<&Filter>,
        with_vector: bool,
    ) -> Result<Vec<ChunkRecord>, VectorError> {
        let mut records = Vec::new();
        let mut offset: Option<Value> = None;
        loop {
            let page = self
                .scroll_page(filter, with_vector, offset.as_ref())
                .await?;
            records.extend(page.points.into_iter().map(|p| {
                ChunkRecord::new(id_to_string(p.id), p.vector.unwrap_or_default(), p.payload)
            }));
            match page.next_page_offset {
                Some(next) if !next.is_null() => offset = Some(next),
                _ => break,
            }
        }
        Ok(records)
    }

    async fn count(&self, filter: Option<&Filter>) -> Result<usize, VectorError> {
        let url = self.collection_url("/points/count");
        let mut body = json!({ "exact": true });
        if let Some(filter) = filter {
            body["filter"] = json!(filter);
        }
        let response = self
            .send(self.request(Method::POST, &url).json(&body), &[])
            .await?;
        let envelope: Envelope<CountResult> = response.json().await?;
        Ok(envelope.result.count)
    }
}
