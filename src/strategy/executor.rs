//! Strategy pipeline executor
//!
//! Resolves every enabled stage up front (an unknown stage or invalid config
//! fails before any work starts), then runs them in order over one context,
//! timing each stage in milliseconds.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

use crate::errors::{EvalError, Result};
use crate::strategy::{PipelineServices, Stage, StageRegistry, StrategyContext, StrategyDefinition};
use crate::types::RetrievedCandidate;

/// Result of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub context: StrategyContext,
    /// Final ranked list with `is_relevant` marked
    pub retrieved_docs: Vec<RetrievedCandidate>,
    /// Wall time of the whole run in milliseconds
    pub total_ms: f64,
}

/// A strategy whose stages are resolved and validated
#[derive(Clone)]
pub struct CompiledStrategy {
    /// (timing key, stage)
    stages: Vec<(String, Arc<dyn Stage>)>,
}

impl CompiledStrategy {
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_keys(&self) -> Vec<&str> {
        self.stages.iter().map(|(key, _)| key.as_str()).collect()
    }

    /// Run every stage over `ctx`
    #[instrument(skip_all, fields(query_id = %ctx.query_id))]
    pub async fn run(&self, mut ctx: StrategyContext, services: &PipelineServices) -> Result<PipelineOutput> {
        let started = Instant::now();

        for (key, stage) in &self.stages {
            let stage_started = Instant::now();
            stage.execute(&mut ctx, services).await.map_err(|e| {
                if e.is_configuration() || matches!(e, EvalError::StageFailed { .. }) {
                    e
                } else {
                    EvalError::StageFailed {
                        stage: key.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;
            let elapsed = stage_started.elapsed().as_secs_f64() * 1000.0;
            ctx.stage_timings.insert(key.clone(), elapsed);
            debug!(stage = %key, elapsed_ms = elapsed, "stage finished");
        }

        let mut retrieved_docs = ctx.final_results().to_vec();
        for candidate in &mut retrieved_docs {
            candidate.is_relevant = ctx.relevant_doc_ids.contains(&candidate.parent_id);
        }

        Ok(PipelineOutput {
            context: ctx,
            retrieved_docs,
            total_ms: started.elapsed().as_secs_f64() * 1000.0,
        })
    }
}

/// Runs strategies against a stage registry
#[derive(Clone)]
pub struct PipelineExecutor {
    registry: Arc<StageRegistry>,
}

impl PipelineExecutor {
    pub fn new(registry: Arc<StageRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Resolve every enabled stage. Disabled stages are skipped.
    pub fn compile(&self, strategy: &StrategyDefinition) -> Result<CompiledStrategy> {
        let mut stages: Vec<(String, Arc<dyn Stage>)> = Vec::new();
        for config in strategy.enabled_stages() {
            let stage = self.registry.build(config)?;
            let occurrences = stages
                .iter()
                .filter(|(_, s)| s.name() == config.name)
                .count();
            let key = if occurrences == 0 {
                config.name.clone()
            } else {
                format!("{}#{}", config.name, occurrences + 1)
            };
            stages.push((key, stage));
        }
        Ok(CompiledStrategy { stages })
    }

    /// Compile and run in one step
    pub async fn execute(
        &self,
        strategy: &StrategyDefinition,
        ctx: StrategyContext,
        services: &PipelineServices,
    ) -> Result<PipelineOutput> {
        self.compile(strategy)?.run(ctx, services).await
    }
}

impl Default for PipelineExecutor {
    fn default() -> Self {
        Self::new(Arc::new(StageRegistry::new()))
    }
}
