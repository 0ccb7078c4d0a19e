//! embedeval - Retrieval Strategy Evaluation Engine
//!
//! Scores embedding and retrieval strategies against a labeled corpus,
//! resumably, across many (query x strategy) evaluation units.
//!
//! # Architecture
//!
//! - **metrics**: NDCG, Recall, MRR, MAP and HitRate at cutoff K
//! - **cache**: content-addressed, size-bounded LRU embedding cache
//! - **stages**: chunking, retrieval, fusion and reranking algorithms
//! - **strategy**: stage registry, presets and the pipeline executor
//! - **runner**: checkpointed concurrent job runner and run reports

pub mod errors;
pub mod types;
pub mod metrics;
pub mod cache;
pub mod providers;
pub mod stages;
pub mod strategy;
pub mod dataset;
pub mod config;
pub mod runner;
pub mod cli;

// Re-export commonly used types
pub use cache::EmbeddingCache;
pub use config::EvalConfig;
pub use errors::{EvalError, Result};
pub use providers::{EmbeddingProvider, HashEmbeddingProvider, Judge};
pub use runner::{JobRunner, RunReport, RunnerOptions};
pub use strategy::{PipelineExecutor, PipelineServices, StrategyDefinition, StrategyVariant};
pub use types::{Document, EvaluationResult, RetrievedCandidate, TestCase};
