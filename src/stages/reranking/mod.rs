//! Reranking stages
//!
//! Rerankers read the best list produced so far (fused, else vector, else
//! BM25 results) and write `reranked_docs`.

pub mod llm;
pub mod mmr;

pub use llm::{build_llm, LlmConfig, LlmReranker};
pub use mmr::{build_mmr, mmr_select, MmrConfig, MmrReranker};
