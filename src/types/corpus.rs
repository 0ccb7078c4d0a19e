//! Corpus documents and labeled queries

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A corpus document. Read-only once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Document {
    /// Create a document without metadata
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: serde_json::Map::new(),
        }
    }
}

/// A labeled query with its ground-truth relevant documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: String,
    pub query: String,
    #[serde(alias = "relevantDocIds")]
    pub relevant_docs: Vec<String>,
    /// Graded relevance, parallel to `relevant_docs`. Binary when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_scores: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl TestCase {
    /// Create a binary-relevance test case
    pub fn new(
        id: impl Into<String>,
        query: impl Into<String>,
        relevant_docs: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
            relevant_docs: relevant_docs.into_iter().map(Into::into).collect(),
            relevance_scores: None,
            tags: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Attach graded relevance scores
    pub fn with_scores(mut self, scores: Vec<f64>) -> Self {
        self.relevance_scores = Some(scores);
        self
    }

    /// Set of relevant document ids
    pub fn relevant_set(&self) -> HashSet<String> {
        self.relevant_docs.iter().cloned().collect()
    }

    /// Relevance grade per relevant document
    pub fn judgments(&self) -> RelevanceJudgments {
        RelevanceJudgments::from_test_case(self)
    }
}

/// Relevance grade lookup for one query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelevanceJudgments {
    grades: HashMap<String, f64>,
}

impl RelevanceJudgments {
    pub fn from_test_case(test_case: &TestCase) -> Self {
        let mut grades = HashMap::with_capacity(test_case.relevant_docs.len());
        for (i, doc_id) in test_case.relevant_docs.iter().enumerate() {
            let grade = test_case
                .relevance_scores
                .as_ref()
                .and_then(|scores| scores.get(i).copied())
                .unwrap_or(1.0);
            grades.insert(doc_id.clone(), grade);
        }
        Self { grades }
    }

    /// Grade of a document; 0 when it is not relevant
    pub fn grade(&self, doc_id: &str) -> f64 {
        self.grades.get(doc_id).copied().unwrap_or(0.0)
    }

    pub fn is_relevant(&self, doc_id: &str) -> bool {
        self.grades.contains_key(doc_id)
    }

    /// Number of relevant documents for the query
    pub fn relevant_count(&self) -> usize {
        self.grades.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_judgments() {
        let tc = TestCase::new("q1", "rust", ["d1", "d2"]);
        let judgments = tc.judgments();
        assert_eq!(judgments.relevant_count(), 2);
        assert_eq!(judgments.grade("d1"), 1.0);
        assert_eq!(judgments.grade("d3"), 0.0);
        assert!(!judgments.is_relevant("d3"));
    }

    #[test]
    fn test_graded_judgments() {
        let tc = TestCase::new("q1", "rust", ["d1", "d2"]).with_scores(vec![0.4, 2.0]);
        let judgments = tc.judgments();
        assert_eq!(judgments.grade("d1"), 0.4);
        assert_eq!(judgments.grade("d2"), 2.0);
    }

    #[test]
    fn test_test_case_wire_format() {
        let line = r#"{"id":"q1","query":"bread","relevantDocs":["d2"],"relevanceScores":[0.8],"tags":["sts"]}"#;
        let tc: TestCase = serde_json::from_str(line).unwrap();
        assert_eq!(tc.relevant_docs, vec!["d2"]);
        assert_eq!(tc.relevance_scores, Some(vec![0.8]));
        assert_eq!(tc.tags, vec!["sts"]);

        let aliased = r#"{"id":"q2","query":"x","relevantDocIds":["d1"]}"#;
        let tc: TestCase = serde_json::from_str(aliased).unwrap();
        assert_eq!(tc.relevant_docs, vec!["d1"]);
        assert!(tc.relevance_scores.is_none());
    }

    #[test]
    fn test_document_metadata_optional() {
        let doc: Document = serde_json::from_str(r#"{"id":"d1","content":"hello"}"#).unwrap();
        assert!(doc.metadata.is_empty());
    }
}
