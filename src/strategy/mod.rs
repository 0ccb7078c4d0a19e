//! Strategy definitions and the multi-stage pipeline
//!
//! A strategy is an ordered list of stage configs. The registry resolves
//! each `(type, name)` pair to a stage implementation; the executor runs
//! the resolved stages over one [`StrategyContext`] per query.

pub mod context;
pub mod registry;
pub mod executor;
pub mod presets;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::errors::{EvalError, Result};
use crate::runner::checkpoint::validate_path_id;

pub use context::{ResultList, StrategyContext};
pub use executor::{CompiledStrategy, PipelineExecutor, PipelineOutput};
pub use registry::{PipelineServices, Stage, StageFactory, StageRegistry};

/// Pipeline stage category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageType {
    Chunking,
    Retrieval,
    Fusion,
    Reranking,
}

impl fmt::Display for StageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageType::Chunking => "chunking",
            StageType::Retrieval => "retrieval",
            StageType::Fusion => "fusion",
            StageType::Reranking => "reranking",
        };
        f.write_str(s)
    }
}

/// One configured stage in a strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    #[serde(rename = "type")]
    pub stage_type: StageType,
    pub name: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl StageConfig {
    pub fn new(stage_type: StageType, name: impl Into<String>, config: serde_json::Value) -> Self {
        Self {
            stage_type,
            name: name.into(),
            config,
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Ordered stage list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyDefinition {
    pub stages: Vec<StageConfig>,
}

impl StrategyDefinition {
    pub fn new(stages: Vec<StageConfig>) -> Self {
        Self { stages }
    }

    pub fn enabled_stages(&self) -> impl Iterator<Item = &StageConfig> {
        self.stages.iter().filter(|s| s.enabled)
    }

    /// Human-readable `type/name -> ...` chain
    pub fn describe(&self) -> String {
        self.enabled_stages()
            .map(|s| format!("{}/{}", s.stage_type, s.name))
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

/// A named, fully configured strategy under evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyVariant {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub stages: StrategyDefinition,
}

impl StrategyVariant {
    pub fn new(id: impl Into<String>, stages: StrategyDefinition) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            stages,
        }
    }

    /// Built-in preset as a variant
    pub fn preset(name: &str) -> Result<Self> {
        let definition = presets::preset(name).ok_or_else(|| {
            EvalError::ConfigError(format!(
                "unknown strategy preset '{}' (available: {})",
                name,
                presets::preset_names().join(", ")
            ))
        })?;
        Ok(Self {
            id: name.to_string(),
            description: presets::preset_description(name).unwrap_or_default().to_string(),
            stages: definition,
        })
    }
}

/// Load variants from a JSON array file
pub fn load_variants(path: impl AsRef<Path>) -> Result<Vec<StrategyVariant>> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)?;
    let variants: Vec<StrategyVariant> = serde_json::from_str(&json)
        .map_err(|e| EvalError::ConfigError(format!("invalid strategy file {}: {}", path.display(), e)))?;

    let mut seen = std::collections::HashSet::new();
    for variant in &variants {
        validate_path_id("variant", &variant.id)?;
        if !seen.insert(variant.id.as_str()) {
            return Err(EvalError::ConfigError(format!("duplicate variant id '{}'", variant.id)));
        }
    }
    Ok(variants)
}
