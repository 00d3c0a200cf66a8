//! # reindex-embeddings
//!
//! Text to vector conversion for the reindex lab.
//!
//! The embedder is a deterministic stand-in for a real model: reindex
//! correctness does not depend on embedding quality, only on every chunk
//! getting a stable vector of the configured dimension.
//!
//! ## Features
//! - `EmbeddingModel` trait so a real model can be dropped in
//! - 384-dimension hash embedder
//! - Word-boundary text splitter

pub mod error;
pub mod hash;
pub mod model;
pub mod splitter;

pub use error::EmbeddingError;
pub use hash::{HashEmbedder, HASH_EMBEDDING_DIM};
pub use model::{cosine_similarity, Embedding, EmbeddingModel, ModelInfo};
pub use splitter::{TextSplitter, DEFAULT_CHUNK_SIZE};

use tracing::debug;

/// One chunk of a processed document.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedChunk {
    pub content: String,
    pub vector: Vec<f32>,
}

/// Split `content` and embed every chunk, preserving chunk order.
pub fn process_document(
    content: &str,
    splitter: &TextSplitter,
    model: &dyn EmbeddingModel,
) -> Result<Vec<ProcessedChunk>, EmbeddingError> {
    let chunks = splitter.split(content);
    let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
    let embeddings = model.embed_batch(&refs)?;

    debug!(chunks = chunks.len(), model = %model.info().name, "Processed document");

    Ok(chunks
        .into_iter()
        .zip(embeddings)
        .map(|(content, embedding)| ProcessedChunk {
            content,
            vector: embedding.into_vec(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_document_embeds_each_chunk() {
        let text = "word ".repeat(300);
        let splitter = TextSplitter::default();
        let processed = process_document(&text, &splitter, &HashEmbedder::default()).unwrap();

        assert_eq!(processed.len(), splitter.split(&text).len());
        assert!(processed.len() > 1);
        for chunk in &processed {
            assert_eq!(chunk.vector.len(), HASH_EMBEDDING_DIM);
        }
    }

    #[test]
    fn test_process_empty_document() {
        let processed =
            process_document("", &TextSplitter::default(), &HashEmbedder::default()).unwrap();
        assert_eq!(processed.len(), 1);
        assert_eq!(processed[0].content, "");
    }
}
