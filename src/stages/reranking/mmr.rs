//! Maximal marginal relevance

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::errors::{EvalError, Result};
use crate::stages::retrieval::cosine_similarity;
use crate::strategy::registry::parse_stage_config;
use crate::strategy::{PipelineServices, Stage, StageType, StrategyContext};
use crate::types::RetrievedCandidate;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct MmrConfig {
    /// 1.0 is pure relevance, 0.0 pure diversity
    pub lambda: f64,
    pub top_k: usize,
}

impl Default for MmrConfig {
    fn default() -> Self {
        Self { lambda: 0.5, top_k: 10 }
    }
}

fn assign_ranks(mut candidates: Vec<RetrievedCandidate>) -> Vec<RetrievedCandidate> {
    for (i, candidate) in candidates.iter_mut().enumerate() {
        candidate.rank = i + 1;
    }
    candidates
}

/// Greedy MMR selection of up to `top_k` candidates.
///
/// Each step picks the candidate maximizing
/// `lambda * score - (1 - lambda) * max_sim_to_selected`; the earlier
/// candidate wins ties. Returns `None` if any candidate lacks an embedding.
pub fn mmr_select(
    pool: &[RetrievedCandidate],
    embeddings: &HashMap<String, Vec<f64>>,
    lambda: f64,
    top_k: usize,
) -> Option<Vec<RetrievedCandidate>> {
    let vectors: Vec<&Vec<f64>> = pool
        .iter()
        .map(|c| embeddings.get(&c.id))
        .collect::<Option<_>>()?;

    let mut remaining: Vec<usize> = (0..pool.len()).collect();
    let mut selected: Vec<usize> = Vec::new();

    while selected.len() < top_k && !remaining.is_empty() {
        let mut best: Option<(usize, f64)> = None;
        for (pos, &idx) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|&s| cosine_similarity(vectors[idx], vectors[s]))
                .fold(None, |acc: Option<f64>, sim| Some(acc.map_or(sim, |a| a.max(sim))))
                .unwrap_or(0.0);
            let mmr = lambda * pool[idx].score - (1.0 - lambda) * redundancy;
            if best.map_or(true, |(_, b)| mmr > b) {
                best = Some((pos, mmr));
            }
        }
        match best {
            Some((pos, _)) => selected.push(remaining.remove(pos)),
            None => break,
        }
    }

    Some(assign_ranks(selected.into_iter().map(|i| pool[i].clone()).collect()))
}

pub struct MmrReranker {
    config: MmrConfig,
}

#[async_trait]
impl Stage for MmrReranker {
    fn stage_type(&self) -> StageType {
        StageType::Reranking
    }

    fn name(&self) -> &str {
        "mmr"
    }

    async fn execute(&self, ctx: &mut StrategyContext, _services: &PipelineServices) -> Result<()> {
        let pool = ctx.rerank_input().cloned().unwrap_or_default();
        let MmrConfig { lambda, top_k } = self.config;

        let (reranked, fallback) = match mmr_select(&pool, &ctx.document_embeddings, lambda, top_k) {
            Some(selected) => (selected, false),
            None => {
                warn!(query_id = %ctx.query_id, "mmr: embeddings unavailable, keeping input order");
                let mut truncated = pool.clone();
                truncated.truncate(top_k);
                (assign_ranks(truncated), true)
            }
        };

        ctx.stage_metadata.insert(
            self.name().to_string(),
            json!({ "poolSize": pool.len(), "lambda": lambda, "fallback": fallback }),
        );
        ctx.reranked_docs = Some(reranked);
        Ok(())
    }
}

pub fn build_mmr(value: &serde_json::Value) -> Result<Arc<dyn Stage>> {
    let config: MmrConfig = parse_stage_config("mmr", value)?;
    if !(0.0..=1.0).contains(&config.lambda) {
        return Err(EvalError::ConfigError(format!("mmr: lambda must be within [0, 1], got {}", config.lambda)));
    }
    if config.top_k == 0 {
        return Err(EvalError::ConfigError("mmr: topK must be > 0".into()));
    }
    Ok(Arc::new(MmrReranker { config }))
}
