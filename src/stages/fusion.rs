//! Fusion stages
//!
//! Both fusers read the lists named in `inputs` (vector and BM25 results by
//! default) and write `fused_results`. A named list that no earlier stage
//! produced is treated as empty.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{EvalError, Result};
use crate::strategy::registry::parse_stage_config;
use crate::strategy::{PipelineServices, ResultList, Stage, StageType, StrategyContext};
use crate::types::{rank_candidates, RetrievedCandidate};

/// Standard RRF damping constant
pub const RRF_K: f64 = 60.0;

fn default_inputs() -> Vec<ResultList> {
    vec![ResultList::RetrievedDocs, ResultList::Bm25Results]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct RrfConfig {
    pub k: f64,
    pub top_k: usize,
    pub inputs: Vec<ResultList>,
}

impl Default for RrfConfig {
    fn default() -> Self {
        Self {
            k: RRF_K,
            top_k: 10,
            inputs: default_inputs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct WeightedConfig {
    /// One weight per input list
    pub weights: Vec<f64>,
    pub top_k: usize,
    pub inputs: Vec<ResultList>,
}

impl Default for WeightedConfig {
    fn default() -> Self {
        Self {
            weights: vec![0.5, 0.5],
            top_k: 10,
            inputs: default_inputs(),
        }
    }
}

/// Sum per-id contributions across lists, keeping the first copy of each candidate
fn accumulate<'a>(
    lists: impl IntoIterator<Item = (&'a [RetrievedCandidate], Vec<f64>)>,
) -> Vec<RetrievedCandidate> {
    let mut order: Vec<RetrievedCandidate> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();

    for (list, contributions) in lists {
        for (candidate, contribution) in list.iter().zip(contributions) {
            match slots.get(&candidate.id) {
                Some(&slot) => order[slot].score += contribution,
                None => {
                    slots.insert(candidate.id.clone(), order.len());
                    let mut fused = candidate.clone();
                    fused.score = contribution;
                    order.push(fused);
                }
            }
        }
    }
    order
}

/// Reciprocal rank fusion: each list adds `1 / (k + rank)` per candidate.
///
/// Rank is the 1-based position within the list.
pub fn reciprocal_rank_fusion(lists: &[&[RetrievedCandidate]], k: f64, top_k: usize) -> Vec<RetrievedCandidate> {
    let fused = accumulate(lists.iter().map(|list| {
        let contributions = (1..=list.len()).map(|rank| 1.0 / (k + rank as f64)).collect();
        (*list, contributions)
    }));
    rank_candidates(fused, top_k)
}

/// Min-max scale into [0, 1]; a constant list scales to all ones
pub fn min_max_normalize(scores: &[f64]) -> Vec<f64> {
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == min {
        return vec![1.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / (max - min)).collect()
}

/// Weighted sum of per-list min-max normalized scores
pub fn weighted_fusion(
    lists: &[&[RetrievedCandidate]],
    weights: &[f64],
    top_k: usize,
) -> Result<Vec<RetrievedCandidate>> {
    if lists.len() != weights.len() {
        return Err(EvalError::ConfigError(format!(
            "weighted fusion: {} weights for {} input lists",
            weights.len(),
            lists.len()
        )));
    }

    let fused = accumulate(lists.iter().zip(weights).map(|(list, weight)| {
        let scores: Vec<f64> = list.iter().map(|c| c.score).collect();
        let contributions = min_max_normalize(&scores).into_iter().map(|s| s * weight).collect();
        (*list, contributions)
    }));
    Ok(rank_candidates(fused, top_k))
}

fn input_lists<'a>(ctx: &'a StrategyContext, inputs: &[ResultList]) -> Vec<&'a [RetrievedCandidate]> {
    inputs
        .iter()
        .map(|which| ctx.list(*which).map(Vec::as_slice).unwrap_or(&[]))
        .collect()
}

pub struct RrfFusion {
    config: RrfConfig,
}

#[async_trait]
impl Stage for RrfFusion {
    fn stage_type(&self) -> StageType {
        StageType::Fusion
    }

    fn name(&self) -> &str {
        "rrf"
    }

    async fn execute(&self, ctx: &mut StrategyContext, _services: &PipelineServices) -> Result<()> {
        let lists = input_lists(ctx, &self.config.inputs);
        let sizes: Vec<usize> = lists.iter().map(|l| l.len()).collect();
        let fused = reciprocal_rank_fusion(&lists, self.config.k, self.config.top_k);

        ctx.stage_metadata
            .insert(self.name().to_string(), json!({ "inputSizes": sizes, "k": self.config.k }));
        ctx.fused_results = Some(fused);
        Ok(())
    }
}

pub struct WeightedFusion {
    config: WeightedConfig,
}

#[async_trait]
impl Stage for WeightedFusion {
    fn stage_type(&self) -> StageType {
        StageType::Fusion
    }

    fn name(&self) -> &str {
        "weighted"
    }

    async fn execute(&self, ctx: &mut StrategyContext, _services: &PipelineServices) -> Result<()> {
        let lists = input_lists(ctx, &self.config.inputs);
        let sizes: Vec<usize> = lists.iter().map(|l| l.len()).collect();
        let fused = weighted_fusion(&lists, &self.config.weights, self.config.top_k)?;

        ctx.stage_metadata.insert(
            self.name().to_string(),
            json!({ "inputSizes": sizes, "weights": self.config.weights }),
        );
        ctx.fused_results = Some(fused);
        Ok(())
    }
}

pub fn build_rrf(value: &serde_json::Value) -> Result<Arc<dyn Stage>> {
    let config: RrfConfig = parse_stage_config("rrf", value)?;
    if !config.k.is_finite() || config.k < 0.0 {
        return Err(EvalError::ConfigError(format!("rrf: k must be finite and >= 0, got {}", config.k)));
    }
    if config.top_k == 0 || config.inputs.is_empty() {
        return Err(EvalError::ConfigError("rrf: topK and inputs must be non-empty".into()));
    }
    Ok(Arc::new(RrfFusion { config }))
}

pub fn build_weighted(value: &serde_json::Value) -> Result<Arc<dyn Stage>> {
    let config: WeightedConfig = parse_stage_config("weighted", value)?;
    if config.weights.len() != config.inputs.len() {
        return Err(EvalError::ConfigError(format!(
            "weighted: {} weights for {} inputs",
            config.weights.len(),
            config.inputs.len()
        )));
    }
    if config.top_k == 0 || config.inputs.is_empty() {
        return Err(EvalError::ConfigError("weighted: topK and inputs must be non-empty".into()));
    }
    Ok(Arc::new(WeightedFusion { config }))
}
