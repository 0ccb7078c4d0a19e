//! Okapi BM25 lexical retrieval
//!
//! Document frequencies and average length are computed over the candidate
//! set being searched, so the index is rebuilt per query.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{EvalError, Result};
use crate::strategy::registry::parse_stage_config;
use crate::strategy::{PipelineServices, Stage, StageType, StrategyContext};
use crate::types::rank_candidates;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Bm25Config {
    pub k: usize,
    /// Term-frequency saturation
    pub k1: f64,
    /// Length normalization, 0 disables it
    pub b: f64,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self { k: 10, k1: 1.2, b: 0.75 }
    }
}

/// Lowercased alphanumeric runs
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Term statistics over one candidate set
#[derive(Debug, Clone)]
pub struct Bm25Index {
    term_freqs: Vec<HashMap<String, usize>>,
    doc_lens: Vec<usize>,
    doc_freqs: HashMap<String, usize>,
    avg_len: f64,
}

impl Bm25Index {
    pub fn build<'a>(texts: impl IntoIterator<Item = &'a str>) -> Self {
        let mut term_freqs = Vec::new();
        let mut doc_lens = Vec::new();
        let mut doc_freqs: HashMap<String, usize> = HashMap::new();

        for text in texts {
            let tokens = tokenize(text);
            let mut tf: HashMap<String, usize> = HashMap::new();
            for token in &tokens {
                *tf.entry(token.clone()).or_insert(0) += 1;
            }
            for term in tf.keys() {
                *doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }
            doc_lens.push(tokens.len());
            term_freqs.push(tf);
        }

        let total: usize = doc_lens.iter().sum();
        let avg_len = if doc_lens.is_empty() {
            0.0
        } else {
            total as f64 / doc_lens.len() as f64
        };

        Self {
            term_freqs,
            doc_lens,
            doc_freqs,
            avg_len,
        }
    }

    pub fn len(&self) -> usize {
        self.doc_lens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lens.is_empty()
    }

    /// Non-negative idf variant: ln((N - df + 0.5) / (df + 0.5) + 1)
    pub fn idf(&self, term: &str) -> f64 {
        let n = self.len() as f64;
        let df = self.doc_freqs.get(term).copied().unwrap_or(0) as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Score of document `doc` for the tokenized query
    pub fn score(&self, query_terms: &[String], doc: usize, k1: f64, b: f64) -> f64 {
        let tf = &self.term_freqs[doc];
        let len_norm = if self.avg_len > 0.0 {
            self.doc_lens[doc] as f64 / self.avg_len
        } else {
            0.0
        };

        query_terms
            .iter()
            .filter_map(|term| tf.get(term).map(|&f| (term, f as f64)))
            .map(|(term, f)| self.idf(term) * f * (k1 + 1.0) / (f + k1 * (1.0 - b + b * len_norm)))
            .sum()
    }
}

pub struct Bm25Retriever {
    config: Bm25Config,
}

#[async_trait]
impl Stage for Bm25Retriever {
    fn stage_type(&self) -> StageType {
        StageType::Retrieval
    }

    fn name(&self) -> &str {
        "bm25"
    }

    async fn execute(&self, ctx: &mut StrategyContext, _services: &PipelineServices) -> Result<()> {
        let candidates = ctx.search_candidates();
        let index = Bm25Index::build(candidates.iter().map(|c| c.content.as_str()));

        // Repeated query terms count once
        let mut query_terms = tokenize(&ctx.query);
        query_terms.sort();
        query_terms.dedup();

        let Bm25Config { k, k1, b } = self.config;
        let scored: Vec<_> = candidates
            .into_iter()
            .enumerate()
            .map(|(i, mut candidate)| {
                candidate.score = index.score(&query_terms, i, k1, b);
                candidate
            })
            .collect();
        let matched = scored.iter().filter(|c| c.score > 0.0).count();

        ctx.stage_metadata.insert(
            self.name().to_string(),
            json!({ "candidateCount": index.len(), "matched": matched, "avgLength": index.avg_len }),
        );
        ctx.bm25_results = Some(rank_candidates(scored, k));
        Ok(())
    }
}

pub fn build_bm25(value: &serde_json::Value) -> Result<Arc<dyn Stage>> {
    let config: Bm25Config = parse_stage_config("bm25", value)?;
    if config.k == 0 {
        return Err(EvalError::ConfigError("bm25: k must be > 0".into()));
    }
    if !config.k1.is_finite() || config.k1 < 0.0 {
        return Err(EvalError::ConfigError(format!("bm25: k1 must be finite and >= 0, got {}", config.k1)));
    }
    if !(0.0..=1.0).contains(&config.b) {
        return Err(EvalError::ConfigError(format!("bm25: b must be within [0, 1], got {}", config.b)));
    }
    Ok(Arc::new(Bm25Retriever { config }))
}
