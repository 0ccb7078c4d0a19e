//! Type definitions module
//!
//! Corpus records, pipeline candidates and per-query evaluation results.

pub mod corpus;
pub mod candidate;
pub mod evaluation;

// Re-export commonly used types
pub use corpus::{Document, RelevanceJudgments, TestCase};
pub use candidate::{rank_candidates, Chunk, RetrievedCandidate};
pub use evaluation::{EvaluationResult, MetricSet};
