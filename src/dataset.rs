//! JSONL corpus and query loaders
//!
//! One JSON record per line; blank lines are skipped. Errors name the file
//! and the 1-based line that failed.

use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::errors::{EvalError, Result};
use crate::types::{Document, TestCase};

fn dataset_error(path: &Path, line: usize, reason: impl Into<String>) -> EvalError {
    EvalError::InvalidRecord {
        path: path.to_path_buf(),
        line,
        reason: reason.into(),
    }
}

/// Parse every non-blank line as `T`, returning records with their line numbers
fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<(usize, T)>> {
    let contents = fs::read_to_string(path)?;
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .map(|record| (i + 1, record))
                .map_err(|e| dataset_error(path, i + 1, e.to_string()))
        })
        .collect()
}

/// Load corpus documents. Duplicate ids are rejected.
pub fn load_documents(path: impl AsRef<Path>) -> Result<Vec<Document>> {
    let path = path.as_ref();
    let records: Vec<(usize, Document)> = read_jsonl(path)?;

    let mut seen = HashSet::new();
    for (line, doc) in &records {
        if !seen.insert(doc.id.as_str()) {
            return Err(dataset_error(path, *line, format!("duplicate document id '{}'", doc.id)));
        }
    }

    let documents: Vec<Document> = records.into_iter().map(|(_, doc)| doc).collect();
    info!(path = %path.display(), count = documents.len(), "loaded documents");
    Ok(documents)
}

/// Load labeled queries, checking graded relevance lines up with `relevantDocs`
pub fn load_test_cases(path: impl AsRef<Path>) -> Result<Vec<TestCase>> {
    let path = path.as_ref();
    let records: Vec<(usize, TestCase)> = read_jsonl(path)?;

    let mut seen = HashSet::new();
    for (line, case) in &records {
        if !seen.insert(case.id.as_str()) {
            return Err(dataset_error(path, *line, format!("duplicate query id '{}'", case.id)));
        }
        if let Some(scores) = &case.relevance_scores {
            if scores.len() != case.relevant_docs.len() {
                return Err(dataset_error(
                    path,
                    *line,
                    format!(
                        "relevanceScores has {} entries for {} relevantDocs",
                        scores.len(),
                        case.relevant_docs.len()
                    ),
                ));
            }
        }
    }

    let cases: Vec<TestCase> = records.into_iter().map(|(_, case)| case).collect();
    info!(path = %path.display(), count = cases.len(), "loaded test cases");
    Ok(cases)
}
