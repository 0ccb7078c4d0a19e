//! Stage registry
//!
//! Maps `(type, name)` to a factory that validates the stage config and
//! builds the stage. New algorithms are added by registering a factory;
//! the executor never branches on stage names.
//!
//! Built-in stages:
//! - chunking: fixed-size, semantic, sliding-window
//! - retrieval: vector, bm25
//! - fusion: rrf, weighted
//! - reranking: mmr, llm

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::EmbeddingCache;
use crate::errors::{EvalError, Result};
use crate::providers::{EmbeddingProvider, Judge};
use crate::stages::{chunking, fusion, reranking, retrieval};
use crate::strategy::{StageConfig, StageType, StrategyContext};

/// External capabilities available to stages
#[derive(Clone, Default)]
pub struct PipelineServices {
    pub provider: Option<Arc<dyn EmbeddingProvider>>,
    pub cache: Option<EmbeddingCache>,
    pub judge: Option<Arc<dyn Judge>>,
}

impl PipelineServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_cache(mut self, cache: EmbeddingCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_judge(mut self, judge: Arc<dyn Judge>) -> Self {
        self.judge = Some(judge);
        self
    }

    /// Embedding provider, or a provider error naming the stage that needed it
    pub fn require_provider(&self, stage: &str) -> Result<&Arc<dyn EmbeddingProvider>> {
        self.provider
            .as_ref()
            .ok_or_else(|| EvalError::ProviderError(format!("stage '{stage}' needs an embedding provider")))
    }
}

/// A resolved pipeline stage
#[async_trait]
pub trait Stage: Send + Sync {
    fn stage_type(&self) -> StageType;

    fn name(&self) -> &str;

    async fn execute(&self, ctx: &mut StrategyContext, services: &PipelineServices) -> Result<()>;
}

/// Builds a stage from its JSON config, rejecting invalid configs
pub type StageFactory = fn(&serde_json::Value) -> Result<Arc<dyn Stage>>;

/// Deserialize a stage config, treating `null` as all defaults
pub fn parse_stage_config<T: DeserializeOwned + Default>(stage: &str, value: &serde_json::Value) -> Result<T> {
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value.clone())
        .map_err(|e| EvalError::ConfigError(format!("invalid config for stage '{stage}': {e}")))
}

/// Registry of stage factories keyed by `(type, name)`
#[derive(Clone)]
pub struct StageRegistry {
    factories: HashMap<(StageType, String), StageFactory>,
}

impl StageRegistry {
    /// Registry with every built-in stage
    pub fn new() -> Self {
        let mut registry = Self::empty();

        registry.register(StageType::Chunking, "fixed-size", chunking::build_fixed_size);
        registry.register(StageType::Chunking, "semantic", chunking::build_semantic);
        registry.register(StageType::Chunking, "sliding-window", chunking::build_sliding_window);

        registry.register(StageType::Retrieval, "vector", retrieval::build_vector);
        registry.register(StageType::Retrieval, "bm25", retrieval::build_bm25);

        registry.register(StageType::Fusion, "rrf", fusion::build_rrf);
        registry.register(StageType::Fusion, "weighted", fusion::build_weighted);

        registry.register(StageType::Reranking, "mmr", reranking::build_mmr);
        registry.register(StageType::Reranking, "llm", reranking::build_llm);

        registry
    }

    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Add or replace a stage factory
    pub fn register(&mut self, stage_type: StageType, name: &str, factory: StageFactory) {
        self.factories.insert((stage_type, name.to_string()), factory);
    }

    pub fn contains(&self, stage_type: StageType, name: &str) -> bool {
        self.factories.contains_key(&(stage_type, name.to_string()))
    }

    /// Resolve and build one stage
    pub fn build(&self, config: &StageConfig) -> Result<Arc<dyn Stage>> {
        let factory = self
            .factories
            .get(&(config.stage_type, config.name.clone()))
            .ok_or_else(|| EvalError::UnknownStage {
                stage_type: config.stage_type.to_string(),
                name: config.name.clone(),
            })?;
        factory(&config.config)
    }

    /// Registered `(type, name)` pairs, sorted
    pub fn stage_names(&self) -> Vec<(StageType, String)> {
        let mut names: Vec<_> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new()
    }
}
