//! Mutable state threaded through one pipeline run
//!
//! Each stage reads fields produced before it and writes only its own
//! output field plus its timing and metadata entries. A context is owned by
//! a single job, so it needs no synchronisation.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::types::{Chunk, Document, RetrievedCandidate, TestCase};

/// Named ranked-list fields a stage can consume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultList {
    RetrievedDocs,
    Bm25Results,
    FusedResults,
    RerankedDocs,
}

#[derive(Debug, Clone)]
pub struct StrategyContext {
    pub query: String,
    pub query_id: String,
    pub original_documents: Arc<Vec<Document>>,
    pub relevant_doc_ids: HashSet<String>,
    pub chunks: Option<Vec<Chunk>>,
    pub retrieved_docs: Option<Vec<RetrievedCandidate>>,
    pub bm25_results: Option<Vec<RetrievedCandidate>>,
    pub fused_results: Option<Vec<RetrievedCandidate>>,
    pub reranked_docs: Option<Vec<RetrievedCandidate>>,
    pub query_embedding: Option<Vec<f64>>,
    /// Embedding per candidate id, filled by vector retrieval
    pub document_embeddings: HashMap<String, Vec<f64>>,
    pub stage_timings: BTreeMap<String, f64>,
    pub stage_metadata: BTreeMap<String, serde_json::Value>,
}

impl StrategyContext {
    pub fn new(test_case: &TestCase, documents: Arc<Vec<Document>>) -> Self {
        Self {
            query: test_case.query.clone(),
            query_id: test_case.id.clone(),
            original_documents: documents,
            relevant_doc_ids: test_case.relevant_set(),
            chunks: None,
            retrieved_docs: None,
            bm25_results: None,
            fused_results: None,
            reranked_docs: None,
            query_embedding: None,
            document_embeddings: HashMap::new(),
            stage_timings: BTreeMap::new(),
            stage_metadata: BTreeMap::new(),
        }
    }

    /// Unscored candidates to search: chunks when a chunking stage ran, else documents
    pub fn search_candidates(&self) -> Vec<RetrievedCandidate> {
        match &self.chunks {
            Some(chunks) => chunks
                .iter()
                .map(|c| RetrievedCandidate::new(&c.id, &c.parent_doc_id, &c.content, 0.0))
                .collect(),
            None => self
                .original_documents
                .iter()
                .map(|d| RetrievedCandidate::new(&d.id, &d.id, &d.content, 0.0))
                .collect(),
        }
    }

    pub fn list(&self, which: ResultList) -> Option<&Vec<RetrievedCandidate>> {
        match which {
            ResultList::RetrievedDocs => self.retrieved_docs.as_ref(),
            ResultList::Bm25Results => self.bm25_results.as_ref(),
            ResultList::FusedResults => self.fused_results.as_ref(),
            ResultList::RerankedDocs => self.reranked_docs.as_ref(),
        }
    }

    /// Input for a reranker: fused, else vector, else lexical results
    pub fn rerank_input(&self) -> Option<&Vec<RetrievedCandidate>> {
        self.fused_results
            .as_ref()
            .or(self.retrieved_docs.as_ref())
            .or(self.bm25_results.as_ref())
    }

    /// Final ranked list: reranked, else fused, else retrieved, else empty.
    ///
    /// BM25 output alone never reaches the final list; a lexical-only
    /// strategy routes it through a fusion stage.
    pub fn final_results(&self) -> &[RetrievedCandidate] {
        self.reranked_docs
            .as_ref()
            .or(self.fused_results.as_ref())
            .or(self.retrieved_docs.as_ref())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
