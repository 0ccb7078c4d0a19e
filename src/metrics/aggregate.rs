//! Per-variant aggregation of evaluation results

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{EvaluationResult, MetricSet};

/// Arithmetic mean of each metric at each K over successful results.
///
/// Results are summed in query-id order so a resumed run reproduces the
/// uninterrupted aggregate exactly.
pub fn mean_metrics(results: &[EvaluationResult]) -> BTreeMap<usize, MetricSet> {
    let mut ordered: Vec<&EvaluationResult> = results.iter().collect();
    ordered.sort_by(|a, b| a.query_id.cmp(&b.query_id));

    let mut sums: BTreeMap<usize, (MetricSet, usize)> = BTreeMap::new();
    for result in ordered {
        for (k, set) in &result.metrics {
            let entry = sums.entry(*k).or_default();
            entry.0.accumulate(set);
            entry.1 += 1;
        }
    }

    sums.into_iter()
        .map(|(k, (sum, count))| (k, sum.scaled(1.0 / count as f64)))
        .collect()
}

/// Mean wall time per stage name across results that ran it
pub fn mean_stage_timings(results: &[EvaluationResult]) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for result in results {
        for (stage, ms) in &result.stage_timings {
            let entry = sums.entry(stage.clone()).or_default();
            entry.0 += ms;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(stage, (sum, count))| (stage, sum / count as f64))
        .collect()
}

/// Latency percentiles in milliseconds (nearest-rank)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

impl LatencyPercentiles {
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        Self {
            p50: nearest_rank(&sorted, 50.0),
            p95: nearest_rank(&sorted, 95.0),
            p99: nearest_rank(&sorted, 99.0),
        }
    }
}

fn nearest_rank(sorted: &[f64], percentile: f64) -> f64 {
    let rank = ((percentile / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
