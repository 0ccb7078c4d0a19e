//! Cosine-similarity retrieval over provider embeddings

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::errors::{EvalError, Result};
use crate::providers::embed_with_cache;
use crate::strategy::registry::parse_stage_config;
use crate::strategy::{PipelineServices, Stage, StageType, StrategyContext};
use crate::types::rank_candidates;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct VectorConfig {
    /// Number of candidates to keep
    pub k: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self { k: 10 }
    }
}

/// Cosine similarity of two vectors.
///
/// Returns 0 when dimensions differ or either vector has zero norm.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub struct VectorRetriever {
    config: VectorConfig,
}

#[async_trait]
impl Stage for VectorRetriever {
    fn stage_type(&self) -> StageType {
        StageType::Retrieval
    }

    fn name(&self) -> &str {
        "vector"
    }

    async fn execute(&self, ctx: &mut StrategyContext, services: &PipelineServices) -> Result<()> {
        let provider = services.require_provider(self.name())?;
        let cache = services.cache.as_ref();

        let query_embedding = embed_with_cache(provider.as_ref(), cache, &[ctx.query.clone()])
            .await?
            .pop()
            .ok_or_else(|| EvalError::ProviderError(format!("{} returned no query embedding", provider.name())))?;

        let mut candidates = ctx.search_candidates();
        let texts: Vec<String> = candidates.iter().map(|c| c.content.clone()).collect();
        let embeddings = embed_with_cache(provider.as_ref(), cache, &texts).await?;
        if embeddings.len() != candidates.len() {
            return Err(EvalError::ProviderError(format!(
                "{} returned {} embeddings for {} candidates",
                provider.name(),
                embeddings.len(),
                candidates.len()
            )));
        }

        for (candidate, embedding) in candidates.iter_mut().zip(embeddings) {
            candidate.score = cosine_similarity(&query_embedding, &embedding);
            ctx.document_embeddings.insert(candidate.id.clone(), embedding);
        }
        debug!(candidates = candidates.len(), k = self.config.k, "vector search scored");

        ctx.stage_metadata.insert(
            self.name().to_string(),
            json!({ "candidateCount": candidates.len(), "provider": provider.name(), "model": provider.model() }),
        );
        ctx.query_embedding = Some(query_embedding);
        ctx.retrieved_docs = Some(rank_candidates(candidates, self.config.k));
        Ok(())
    }
}

pub fn build_vector(value: &serde_json::Value) -> Result<Arc<dyn Stage>> {
    let config: VectorConfig = parse_stage_config("vector", value)?;
    if config.k == 0 {
        return Err(EvalError::ConfigError("vector: k must be > 0".into()));
    }
    Ok(Arc::new(VectorRetriever { config }))
}
