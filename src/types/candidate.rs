//! Chunks and ranked retrieval candidates

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A passage cut from a document by a chunking stage. Lives for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub parent_doc_id: String,
    /// Character offset of the first character (inclusive)
    pub start_index: usize,
    /// Character offset one past the last character
    pub end_index: usize,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// A scored entry in a ranked list passed between stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedCandidate {
    /// Document id, or chunk id when the pipeline chunked the corpus
    pub id: String,
    /// Document the candidate belongs to; equals `id` for whole documents
    pub parent_id: String,
    pub content: String,
    pub score: f64,
    /// 1-based position in the list that produced it
    pub rank: usize,
    pub is_relevant: bool,
}

impl RetrievedCandidate {
    pub fn new(
        id: impl Into<String>,
        parent_id: impl Into<String>,
        content: impl Into<String>,
        score: f64,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.into(),
            content: content.into(),
            score,
            rank: 0,
            is_relevant: false,
        }
    }
}

/// Descending score, then ascending id
fn compare_candidates(a: &RetrievedCandidate, b: &RetrievedCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.id.cmp(&b.id))
}

/// Sort, truncate to `top_k` and assign 1-based ranks.
pub fn rank_candidates(mut candidates: Vec<RetrievedCandidate>, top_k: usize) -> Vec<RetrievedCandidate> {
    candidates.sort_by(compare_candidates);
    candidates.truncate(top_k);
    for (i, candidate) in candidates.iter_mut().enumerate() {
        candidate.rank = i + 1;
    }
    candidates
}
