//! Per-query evaluation results

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::RetrievedCandidate;

/// Ranking metrics at a single cutoff K
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSet {
    pub ndcg: f64,
    pub recall: f64,
    pub mrr: f64,
    pub map: f64,
    pub hit_rate: f64,
}

impl MetricSet {
    /// Field-wise sum, used when averaging across queries
    pub fn accumulate(&mut self, other: &MetricSet) {
        self.ndcg += other.ndcg;
        self.recall += other.recall;
        self.mrr += other.mrr;
        self.map += other.map;
        self.hit_rate += other.hit_rate;
    }

    pub fn scaled(&self, factor: f64) -> MetricSet {
        MetricSet {
            ndcg: self.ndcg * factor,
            recall: self.recall * factor,
            mrr: self.mrr * factor,
            map: self.map * factor,
            hit_rate: self.hit_rate * factor,
        }
    }
}

/// Outcome of one (variant, query) job. Immutable once checkpointed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub query_id: String,
    pub retrieved_docs: Vec<RetrievedCandidate>,
    /// Metrics keyed by cutoff K
    pub metrics: BTreeMap<usize, MetricSet>,
    pub usage_latency_ms: f64,
    #[serde(default)]
    pub stage_timings: BTreeMap<String, f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_set_accumulate_and_scale() {
        let mut total = MetricSet::default();
        total.accumulate(&MetricSet {
            ndcg: 1.0,
            recall: 0.5,
            mrr: 1.0,
            map: 0.5,
            hit_rate: 1.0,
        });
        total.accumulate(&MetricSet {
            ndcg: 0.0,
            recall: 0.5,
            mrr: 0.0,
            map: 0.5,
            hit_rate: 0.0,
        });
        let mean = total.scaled(0.5);
        assert_eq!(mean.ndcg, 0.5);
        assert_eq!(mean.recall, 0.5);
        assert_eq!(mean.hit_rate, 0.5);
    }

    #[test]
    fn test_metrics_serialize_with_k_keys() {
        let mut metrics = BTreeMap::new();
        metrics.insert(10, MetricSet::default());
        let result = EvaluationResult {
            query_id: "q1".into(),
            retrieved_docs: Vec::new(),
            metrics,
            usage_latency_ms: 1.5,
            stage_timings: BTreeMap::new(),
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"10\""));
        let back: EvaluationResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}
