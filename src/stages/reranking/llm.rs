//! LLM-judge reranking
//!
//! The top `topK * 2` candidates are scored concurrently by the injected
//! judge. A failed call keeps the candidate's previous score.

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::errors::{EvalError, Result};
use crate::strategy::registry::parse_stage_config;
use crate::strategy::{PipelineServices, Stage, StageType, StrategyContext};
use crate::types::rank_candidates;

/// Judges answer on a 0..=10 scale
const JUDGE_SCALE: f64 = 10.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct LlmConfig {
    pub top_k: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self { top_k: 10 }
    }
}

pub struct LlmReranker {
    config: LlmConfig,
}

#[async_trait]
impl Stage for LlmReranker {
    fn stage_type(&self) -> StageType {
        StageType::Reranking
    }

    fn name(&self) -> &str {
        "llm"
    }

    async fn execute(&self, ctx: &mut StrategyContext, services: &PipelineServices) -> Result<()> {
        let top_k = self.config.top_k;
        let mut shortlist = ctx.rerank_input().cloned().unwrap_or_default();
        shortlist.truncate(top_k.saturating_mul(2));

        let Some(judge) = services.judge.as_ref() else {
            warn!(query_id = %ctx.query_id, "llm rerank: no judge configured, keeping prior scores");
            ctx.stage_metadata
                .insert(self.name().to_string(), json!({ "judged": 0, "failed": shortlist.len() }));
            ctx.reranked_docs = Some(rank_candidates(shortlist, top_k));
            return Ok(());
        };

        let query = ctx.query.as_str();
        let scores = join_all(shortlist.iter().map(|c| judge.score(query, &c.content))).await;

        let mut failed = 0usize;
        for (candidate, outcome) in shortlist.iter_mut().zip(scores) {
            match outcome {
                Ok(score) if score.is_finite() => {
                    candidate.score = (score / JUDGE_SCALE).clamp(0.0, 1.0);
                }
                Ok(score) => {
                    failed += 1;
                    warn!(candidate = %candidate.id, score, "llm rerank: non-finite judge score");
                }
                Err(e) => {
                    failed += 1;
                    warn!(candidate = %candidate.id, error = %e, "llm rerank: judge call failed");
                }
            }
        }

        ctx.stage_metadata.insert(
            self.name().to_string(),
            json!({ "judged": shortlist.len() - failed, "failed": failed }),
        );
        ctx.reranked_docs = Some(rank_candidates(shortlist, top_k));
        Ok(())
    }
}

pub fn build_llm(value: &serde_json::Value) -> Result<Arc<dyn Stage>> {
    let config: LlmConfig = parse_stage_config("llm", value)?;
    if config.top_k == 0 {
        return Err(EvalError::ConfigError("llm: topK must be > 0".into()));
    }
    Ok(Arc::new(LlmReranker { config }))
}
