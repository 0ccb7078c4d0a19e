//! Configuration management for embedeval
//!
//! Provides TOML-based configuration with defaults and validation.
//! Location: ~/.embedeval/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{EvalError, Result};
use crate::providers::hash::DEFAULT_DIMENSION;

/// Upper bound for the default worker count
const MAX_DEFAULT_CONCURRENCY: usize = 8;

/// Complete configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub runner: RunnerConfig,
    pub cache: CacheConfig,
    pub provider: ProviderConfig,
}

/// Job runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub concurrency: usize,
    pub k_values: Vec<usize>,
    pub checkpoint_dir: String,
    pub output_dir: String,
}

/// Embedding cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: String,
    pub max_bytes: u64,
}

/// Offline embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub dimension: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get().clamp(1, MAX_DEFAULT_CONCURRENCY),
            k_values: vec![1, 3, 5, 10],
            checkpoint_dir: "~/.embedeval/checkpoints".to_string(),
            output_dir: "~/.embedeval/results".to_string(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: "~/.embedeval/cache".to_string(),
            max_bytes: 512 * 1024 * 1024,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
        }
    }
}

impl EvalConfig {
    /// Load configuration from file or use defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(config_path) => Self::load_from_file(config_path),
            None => Self::load_default(),
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| EvalError::ConfigError(format!("Failed to read config {}: {}", path.display(), e)))?;

        let config: EvalConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the standard location, or built-in defaults when absent
    pub fn load_default() -> Result<Self> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }
        Ok(EvalConfig::default())
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".embedeval").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.runner.concurrency == 0 {
            return Err(EvalError::ConfigError("concurrency must be greater than 0".to_string()));
        }

        if self.runner.k_values.is_empty() || self.runner.k_values.contains(&0) {
            return Err(EvalError::ConfigError(
                "k_values must be non-empty and every K greater than 0".to_string(),
            ));
        }

        if self.cache.max_bytes == 0 {
            return Err(EvalError::ConfigError("cache max_bytes must be greater than 0".to_string()));
        }

        if self.provider.dimension == 0 {
            return Err(EvalError::ConfigError("provider dimension must be greater than 0".to_string()));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| EvalError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Expand tilde in paths
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        Self::expand_path(&self.runner.checkpoint_dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        Self::expand_path(&self.runner.output_dir)
    }

    pub fn cache_dir(&self) -> PathBuf {
        Self::expand_path(&self.cache.dir)
    }
}
