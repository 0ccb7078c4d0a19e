//! Retrieval stages
//!
//! Both stages search `StrategyContext::search_candidates`, so they score
//! chunks when a chunking stage ran and whole documents otherwise.

pub mod bm25;
pub mod vector;

pub use bm25::{build_bm25, tokenize, Bm25Config, Bm25Index, Bm25Retriever};
pub use vector::{build_vector, cosine_similarity, VectorConfig, VectorRetriever};
