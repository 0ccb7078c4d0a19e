//! FNV-1a bag-of-words embedder
//!
//! Deterministic, lexical-only vectors with no model download. Used for
//! offline runs and as the test double for the pipeline.

use async_trait::async_trait;

use crate::errors::{EvalError, Result};
use crate::providers::EmbeddingProvider;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Tokens shorter than this are ignored
const MIN_TOKEN_LEN: usize = 2;

pub const DEFAULT_DIMENSION: usize = 256;

fn fnv1a_hash(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Hash-projection embedding provider
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dimension: usize,
    model: String,
}

impl HashEmbeddingProvider {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(EvalError::ConfigError("hash embedding dimension must be > 0".into()));
        }
        Ok(Self {
            dimension,
            model: format!("fnv1a-{dimension}"),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Synchronous embedding; hashing needs no I/O
    pub fn embed_sync(&self, text: &str) -> Vec<f64> {
        let mut embedding = vec![0.0; self.dimension];
        let lower = text.to_lowercase();
        for token in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() >= MIN_TOKEN_LEN)
        {
            let hash = fnv1a_hash(token.as_bytes());
            let index = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 1 { 1.0 } else { -1.0 };
            embedding[index] += sign;
        }

        let norm = embedding.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }
        embedding
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            model: format!("fnv1a-{DEFAULT_DIMENSION}"),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    fn name(&self) -> &str {
        "hash"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_and_normalised() {
        let provider = HashEmbeddingProvider::default();
        let a = provider.embed_sync("machine learning basics");
        let b = provider.embed_sync("machine learning basics");
        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_DIMENSION);
        let norm: f64 = a.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let provider = HashEmbeddingProvider::new(8).unwrap();
        assert!(provider.embed_sync("a").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(HashEmbeddingProvider::new(0).is_err());
    }

    #[test]
    fn test_async_embed_matches_sync() {
        let provider = HashEmbeddingProvider::new(32).unwrap();
        let asynced = tokio_test::block_on(provider.embed("sourdough bread")).unwrap();
        assert_eq!(asynced, provider.embed_sync("sourdough bread"));
        assert_eq!(provider.model(), "fnv1a-32");
    }
}
