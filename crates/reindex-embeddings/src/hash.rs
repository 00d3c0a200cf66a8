//! Deterministic hash-based embedder.
//!
//! Produces stable pseudo-embeddings without a model: identical text always
//! maps to the identical unit vector, and different texts almost never
//! collide. Useful for exercising the indexing path, not for relevance.

use crate::error::EmbeddingError;
use crate::model::{Embedding, EmbeddingModel, ModelInfo};

/// Output dimension, matching all-MiniLM-L6-v2.
pub const HASH_EMBEDDING_DIM: usize = 384;

/// 32-bit wrapping string hash over UTF-16 code units (`h = h * 31 + c`).
fn string_hash(seed: &str) -> i32 {
    seed.encode_utf16().fold(0i32, |hash, unit| {
        hash.wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit))
    })
}

/// Embedder whose dimension `i` is derived from the hash of `text + i`.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    info: ModelInfo,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(HASH_EMBEDDING_DIM)
    }
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            info: ModelInfo {
                name: "hash-embedder".to_string(),
                dimension,
            },
        }
    }
}

impl EmbeddingModel for HashEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if self.info.dimension == 0 {
            return Err(EmbeddingError::InvalidInput(
                "embedding dimension must be > 0".to_string(),
            ));
        }

        let values = (0..self.info.dimension)
            .map(|i| {
                let h = f64::from(string_hash(&format!("{}{}", text, i)));
                (h.sin() * 0.5 + (h * 2.0).cos() * 0.5) as f32
            })
            .collect();

        Ok(Embedding::new(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_hash_matches_java_style_hash() {
        assert_eq!(string_hash(""), 0);
        assert_eq!(string_hash("a"), 97);
        // 97 * 31 + 98
        assert_eq!(string_hash("ab"), 3105);
        // Long input wraps instead of overflowing.
        let _ = string_hash(&"x".repeat(10_000));
    }

    #[test]
    fn test_embedding_is_deterministic_unit_vector() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("the quick brown fox").unwrap();
        let b = embedder.embed("the quick brown fox").unwrap();

        assert_eq!(a.dimension(), HASH_EMBEDDING_DIM);
        assert_eq!(a, b);
        let norm: f32 = a.values.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_different_text_differs() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("alpha").unwrap();
        let b = embedder.embed("beta").unwrap();
        assert!(a.cosine_similarity(&b) < 0.999);
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let embedder = HashEmbedder::new(0);
        assert!(embedder.embed("x").is_err());
    }
}
