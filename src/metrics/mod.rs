//! Ranking metrics engine
//!
//! Pure functions scoring a ranked list against ground truth at cutoff K,
//! and the aggregation used to summarise a strategy variant.

pub mod ranking;
pub mod aggregate;

pub use ranking::{
    dcg, evaluate, hit_rate_at_k, map_at_k, mrr_at_k, ndcg_at_k, ranked_doc_ids, recall_at_k,
};
pub use aggregate::{mean_metrics, mean_stage_timings, LatencyPercentiles};
