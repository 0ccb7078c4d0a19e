//! Embedding and judge capabilities consumed by the pipeline
//!
//! Concrete vendor clients live outside this crate; the engine only sees
//! these traits. Providers must be deterministic per (provider, model, text)
//! for the embedding cache to be correct.

pub mod hash;
pub mod cached;

use async_trait::async_trait;

use crate::errors::Result;

pub use cached::{embed_with_cache, CachedEmbeddingProvider};
pub use hash::HashEmbeddingProvider;

/// Text embedding capability
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name, part of the cache key
    fn name(&self) -> &str;

    /// Model name, part of the cache key
    fn model(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f64>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Relevance judge used by LLM reranking
#[async_trait]
pub trait Judge: Send + Sync {
    /// Relevance of `candidate` to `query` on a 0-10 scale
    async fn score(&self, query: &str, candidate: &str) -> Result<f64>;
}
