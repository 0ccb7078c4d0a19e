//! Pipeline stage implementations
//!
//! Components:
//! - Chunking: fixed-size, paragraph-aggregating and sliding-window passages
//! - Retrieval: cosine similarity over embeddings, and BM25
//! - Fusion: reciprocal rank fusion and weighted min-max fusion
//! - Reranking: maximal marginal relevance and LLM-judge scoring

pub mod chunking;
pub mod retrieval;
pub mod fusion;
pub mod reranking;
