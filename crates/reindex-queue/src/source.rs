//! Where the worker gets the text to reindex.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::QueueError;

/// Document content by id. `Ok(None)` means the document has no content.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch(&self, document_id: &str) -> Result<Option<String>, QueueError>;
}

/// In-memory content, mostly for tests.
#[derive(Debug, Default)]
pub struct MapContentSource {
    documents: RwLock<HashMap<String, String>>,
}

impl MapContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, document_id: impl Into<String>, content: impl Into<String>) {
        if let Ok(mut documents) = self.documents.write() {
            documents.insert(document_id.into(), content.into());
        }
    }

    pub fn remove(&self, document_id: &str) {
        if let Ok(mut documents) = self.documents.write() {
            documents.remove(document_id);
        }
    }
}

#[async_trait]
impl ContentSource for MapContentSource {
    async fn fetch(&self, document_id: &str) -> Result<Option<String>, QueueError> {
        let documents = self
            .documents
            .read()
            .map_err(|_| QueueError::Content("content map poisoned".to_string()))?;
        Ok(documents.get(document_id).cloned())
    }
}

/// Reads `<dir>/<documentId>.txt`.
#[derive(Debug, Clone)]
pub struct DirectoryContentSource {
    dir: PathBuf,
}

impl DirectoryContentSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, document_id: &str) -> Result<PathBuf, QueueError> {
        // Ids become file names; keep them inside the directory.
        if document_id.is_empty()
            || document_id.contains(|c: char| c == '/' || c == '\\')
            || document_id.starts_with('.')
        {
            return Err(QueueError::Content(format!(
                "invalid document id for file lookup: {document_id:?}"
            )));
        }
        Ok(self.dir.join(format!("{document_id}.txt")))
    }
}

#[async_trait]
impl ContentSource for DirectoryContentSource {
    async fn fetch(&self, document_id: &str) -> Result<Option<String>, QueueError> {
        let path = self.path_for(document_id)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_map_source() {
        let source = MapContentSource::new();
        source.insert("a", "alpha");
        assert_eq!(source.fetch("a").await.unwrap().as_deref(), Some("alpha"));
        source.remove("a");
        assert_eq!(source.fetch("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_directory_source() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("doc-1.txt"), "pump manual").unwrap();
        let source = DirectoryContentSource::new(dir.path());

        assert_eq!(
            source.fetch("doc-1").await.unwrap().as_deref(),
            Some("pump manual")
        );
        assert_eq!(source.fetch("doc-2").await.unwrap(), None);
        assert!(source.fetch("../etc/passwd").await.is_err());
    }
}
