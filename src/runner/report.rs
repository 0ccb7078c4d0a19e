//! Run and per-variant summaries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::errors::Result;
use crate::metrics::{mean_metrics, mean_stage_timings, LatencyPercentiles};
use crate::runner::checkpoint::FailedQuery;
use crate::types::{EvaluationResult, MetricSet};

/// Aggregate outcome of one strategy variant
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantReport {
    pub variant_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Queries never dispatched because the run was stopped
    pub pending: usize,
    pub failed_queries: Vec<FailedQuery>,
    /// Mean of each metric over succeeded queries, keyed by K
    pub metrics: BTreeMap<usize, MetricSet>,
    pub latency_ms: LatencyPercentiles,
    pub stage_timings_ms: BTreeMap<String, f64>,
    /// Per-query results, not written to the report file
    #[serde(skip)]
    pub results: Vec<EvaluationResult>,
}

impl VariantReport {
    pub fn from_outcomes(
        variant_id: &str,
        description: &str,
        total: usize,
        mut results: Vec<EvaluationResult>,
        mut failed_queries: Vec<FailedQuery>,
    ) -> Self {
        results.sort_by(|a, b| a.query_id.cmp(&b.query_id));
        failed_queries.sort_by(|a, b| a.query_id.cmp(&b.query_id));

        let latencies: Vec<f64> = results.iter().map(|r| r.usage_latency_ms).collect();
        let succeeded = results.len();
        let failed = failed_queries.len();

        Self {
            variant_id: variant_id.to_string(),
            description: description.to_string(),
            total,
            succeeded,
            failed,
            pending: total.saturating_sub(succeeded + failed),
            failed_queries,
            metrics: mean_metrics(&results),
            latency_ms: LatencyPercentiles::from_samples(&latencies),
            stage_timings_ms: mean_stage_timings(&results),
            results,
        }
    }

    pub fn failed_query_ids(&self) -> Vec<&str> {
        self.failed_queries.iter().map(|f| f.query_id.as_str()).collect()
    }
}

/// Summary of one evaluation run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub test_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub k_values: Vec<usize>,
    /// True when a stop request cut the run short
    pub interrupted: bool,
    pub variants: Vec<VariantReport>,
}

impl RunReport {
    pub fn variant(&self, variant_id: &str) -> Option<&VariantReport> {
        self.variants.iter().find(|v| v.variant_id == variant_id)
    }

    pub fn total_failed(&self) -> usize {
        self.variants.iter().map(|v| v.failed).sum()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write pretty JSON, creating parent directories
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn result(query_id: &str, recall: f64, latency: f64) -> EvaluationResult {
        EvaluationResult {
            query_id: query_id.to_string(),
            retrieved_docs: vec![],
            metrics: BTreeMap::from([(5, MetricSet { recall, ..Default::default() })]),
            usage_latency_ms: latency,
            stage_timings: BTreeMap::from([("vector".to_string(), latency / 2.0)]),
        }
    }

    #[test]
    fn test_counts_exclude_failures_from_means() {
        let report = VariantReport::from_outcomes(
            "baseline",
            "",
            4,
            vec![result("q2", 0.5, 20.0), result("q1", 1.0, 10.0)],
            vec![FailedQuery {
                query_id: "q3".into(),
                error: "boom".into(),
            }],
        );
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.pending, 1);
        assert_eq!(report.metrics[&5].recall, 0.75);
        assert_eq!(report.latency_ms.p50, 10.0);
        assert_eq!(report.latency_ms.p99, 20.0);
        assert_eq!(report.stage_timings_ms["vector"], 7.5);
        assert_eq!(report.failed_query_ids(), vec!["q3"]);
        assert_eq!(report.results[0].query_id, "q1");
    }

    #[test]
    fn test_write_and_load_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("report.json");
        let now = Utc::now();
        let report = RunReport {
            run_id: "r1".into(),
            test_id: "t".into(),
            started_at: now,
            finished_at: now,
            k_values: vec![5],
            interrupted: false,
            variants: vec![VariantReport::from_outcomes("baseline", "plain", 1, vec![result("q1", 1.0, 3.0)], vec![])],
        };
        report.write_json(&path).unwrap();

        let loaded = RunReport::load(&path).unwrap();
        assert_eq!(loaded.run_id, "r1");
        let variant = loaded.variant("baseline").unwrap();
        assert_eq!(variant.metrics[&5].recall, 1.0);
        assert!(variant.results.is_empty());

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"failedQueries\""));
        assert!(raw.contains("\"p95\""));
    }
}
