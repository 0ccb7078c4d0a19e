//! Cache-first embedding calls

use async_trait::async_trait;
use std::sync::Arc;

use crate::cache::EmbeddingCache;
use crate::errors::{EvalError, Result};
use crate::providers::EmbeddingProvider;

/// Embed `texts`, serving hits from the cache and batching the misses.
///
/// Without a cache every text goes to the provider.
pub async fn embed_with_cache(
    provider: &dyn EmbeddingProvider,
    cache: Option<&EmbeddingCache>,
    texts: &[String],
) -> Result<Vec<Vec<f64>>> {
    let Some(cache) = cache else {
        return provider.embed_batch(texts).await;
    };

    let mut resolved = cache.get_batch(texts, provider.name(), provider.model()).await;
    let missing: Vec<usize> = resolved
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_none())
        .map(|(i, _)| i)
        .collect();

    if !missing.is_empty() {
        let miss_texts: Vec<String> = missing.iter().map(|&i| texts[i].clone()).collect();
        let vectors = provider.embed_batch(&miss_texts).await?;
        if vectors.len() != miss_texts.len() {
            return Err(EvalError::ProviderError(format!(
                "{} returned {} embeddings for {} texts",
                provider.name(),
                vectors.len(),
                miss_texts.len()
            )));
        }
        cache
            .set_batch(&miss_texts, provider.name(), provider.model(), &vectors)
            .await?;
        for (slot, vector) in missing.into_iter().zip(vectors) {
            resolved[slot] = Some(vector);
        }
    }

    Ok(resolved.into_iter().flatten().collect())
}

/// Provider wrapper that consults the embedding cache before the inner provider
pub struct CachedEmbeddingProvider {
    inner: Arc<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
}

impl CachedEmbeddingProvider {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, cache: EmbeddingCache) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbeddingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        if let Some(hit) = self.cache.get(text, self.name(), self.model()).await {
            return Ok(hit);
        }
        let vector = self.inner.embed(text).await?;
        self.cache.set(text, self.name(), self.model(), &vector).await?;
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        embed_with_cache(self.inner.as_ref(), Some(&self.cache), texts).await
    }
}
