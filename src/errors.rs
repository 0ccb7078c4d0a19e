//! Error types for embedeval
//!
//! Every failure the evaluation engine can raise is an [`EvalError`]. The
//! variants follow the engine's failure classes: configuration errors are
//! fatal and never retried, provider and stage errors are isolated to the
//! single (variant, query) job that raised them.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the evaluation engine
#[derive(Error, Debug)]
pub enum EvalError {
    /// Invalid strategy, stage or runner configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A strategy names a stage that is not registered
    #[error("Unknown {stage_type} stage '{name}'")]
    UnknownStage { stage_type: String, name: String },

    /// Embedding provider call failed
    #[error("Embedding provider error: {0}")]
    ProviderError(String),

    /// Relevance judge call failed
    #[error("Judge error: {0}")]
    JudgeError(String),

    /// A pipeline stage raised while running
    #[error("Stage '{stage}' failed: {reason}")]
    StageFailed { stage: String, reason: String },

    /// Checkpoint log could not be read or appended
    #[error("Checkpoint error: {0}")]
    CheckpointError(String),

    /// Embedding cache failure that cannot be recovered as a miss
    #[error("Cache error: {0}")]
    CacheError(String),

    /// Malformed corpus or query record
    #[error("Dataset error in {path:?} line {line}: {reason}")]
    InvalidRecord {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// TOML config parse errors
    #[error("Config parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    /// Generic errors with context
    #[error("Evaluation error: {0}")]
    Generic(String),
}

impl EvalError {
    /// Configuration failures abort the run instead of a single job
    pub fn is_configuration(&self) -> bool {
        matches!(self, EvalError::ConfigError(_) | EvalError::UnknownStage { .. })
    }
}

/// Result type alias for evaluation operations
pub type Result<T> = std::result::Result<T, EvalError>;

/// Convert anyhow errors to EvalError
impl From<anyhow::Error> for EvalError {
    fn from(err: anyhow::Error) -> Self {
        EvalError::Generic(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EvalError::UnknownStage {
            stage_type: "fusion".to_string(),
            name: "borda".to_string(),
        };
        assert!(err.to_string().contains("fusion"));
        assert!(err.to_string().contains("borda"));
    }

    #[test]
    fn test_configuration_classification() {
        assert!(EvalError::ConfigError("overlap".into()).is_configuration());
        assert!(EvalError::UnknownStage {
            stage_type: "retrieval".into(),
            name: "splade".into(),
        }
        .is_configuration());
        assert!(!EvalError::ProviderError("timeout".into()).is_configuration());
        assert!(!EvalError::JudgeError("500".into()).is_configuration());
    }

    #[test]
    fn test_dataset_error_names_line() {
        let err = EvalError::InvalidRecord {
            path: PathBuf::from("queries.jsonl"),
            line: 7,
            reason: "missing field `query`".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("queries.jsonl"));
        assert!(msg.contains('7'));
    }
}
