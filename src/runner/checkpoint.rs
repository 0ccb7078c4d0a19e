//! Append-only checkpoint log, one per (run, variant)
//!
//! Each line is one JSON record: a header first, then one completed or
//! failed outcome per query. A crash mid-append leaves a torn last line,
//! which is cut off when the log is reopened.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::{EvalError, Result};
use crate::types::EvaluationResult;

/// Identifies what a checkpoint file belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointHeader {
    pub run_id: String,
    pub test_id: String,
    pub variant_id: String,
    pub created_at: DateTime<Utc>,
}

impl CheckpointHeader {
    pub fn new(run_id: &str, test_id: &str, variant_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            test_id: test_id.to_string(),
            variant_id: variant_id.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// A query whose job failed, with the error that ended it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedQuery {
    pub query_id: String,
    pub error: String,
}

/// One line of the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CheckpointRecord {
    Header(CheckpointHeader),
    Completed(EvaluationResult),
    Failed(FailedQuery),
}

impl CheckpointRecord {
    fn query_id(&self) -> Option<&str> {
        match self {
            CheckpointRecord::Header(_) => None,
            CheckpointRecord::Completed(result) => Some(&result.query_id),
            CheckpointRecord::Failed(failed) => Some(&failed.query_id),
        }
    }
}

/// Outcomes recovered from an existing log
#[derive(Debug, Clone, Default)]
pub struct CheckpointState {
    pub completed: Vec<EvaluationResult>,
    pub failed: Vec<FailedQuery>,
}

impl CheckpointState {
    /// Query ids that need no further work
    pub fn done_ids(&self) -> HashSet<String> {
        self.completed
            .iter()
            .map(|r| r.query_id.clone())
            .chain(self.failed.iter().map(|f| f.query_id.clone()))
            .collect()
    }

    pub fn completed_ids(&self) -> HashSet<String> {
        self.completed.iter().map(|r| r.query_id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.completed.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reject ids that cannot be used as a single file name under the checkpoint directory
pub fn validate_path_id(kind: &str, id: &str) -> Result<()> {
    let unsafe_id = id.is_empty()
        || id == "."
        || id.contains("..")
        || id.contains(['/', '\\', '\0'])
        || Path::new(id).is_absolute();
    if unsafe_id {
        return Err(EvalError::ConfigError(format!(
            "{kind} id '{id}' must be a plain name without path separators or '..'"
        )));
    }
    Ok(())
}

/// Checkpoint path for one variant of one run
pub fn checkpoint_path(dir: &Path, run_id: &str, variant_id: &str) -> PathBuf {
    dir.join(run_id).join(format!("{variant_id}.jsonl"))
}

/// Parse log contents, returning the records and the byte length of the valid prefix
fn parse_log(path: &Path, contents: &[u8]) -> Result<(Vec<CheckpointRecord>, usize)> {
    let mut records = Vec::new();
    let mut valid_len = 0;

    for segment in contents.split_inclusive(|b| *b == b'\n') {
        if segment.last() != Some(&b'\n') {
            // torn final append
            break;
        }
        if !segment.iter().all(u8::is_ascii_whitespace) {
            let record = serde_json::from_slice(segment).map_err(|e| {
                EvalError::CheckpointError(format!("{}: corrupt record after byte {}: {}", path.display(), valid_len, e))
            })?;
            records.push(record);
        }
        valid_len += segment.len();
    }
    Ok((records, valid_len))
}

/// Serialized appender for one variant's log
#[derive(Debug)]
pub struct CheckpointLog {
    path: PathBuf,
    header: CheckpointHeader,
    file: Mutex<File>,
}

impl CheckpointLog {
    /// Open or create the log, returning it with the outcomes already recorded.
    ///
    /// An existing log must belong to the same run and variant.
    pub async fn open(path: impl Into<PathBuf>, header: CheckpointHeader) -> Result<(Self, CheckpointState)> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let existing = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let (records, valid_len) = parse_log(&path, &existing)?;

        let mut file = OpenOptions::new().create(true).append(true).open(&path).await?;
        if valid_len < existing.len() {
            warn!(
                path = %path.display(),
                dropped_bytes = existing.len() - valid_len,
                "checkpoint: cutting torn trailing record"
            );
            file.set_len(valid_len as u64).await?;
        }

        let mut records = records.into_iter();
        let (header, state) = match records.next() {
            None => {
                let log = Self {
                    path,
                    header: header.clone(),
                    file: Mutex::new(file),
                };
                log.append(&CheckpointRecord::Header(header.clone())).await?;
                return Ok((log, CheckpointState::default()));
            }
            Some(CheckpointRecord::Header(found)) => {
                if found.run_id != header.run_id || found.variant_id != header.variant_id {
                    return Err(EvalError::CheckpointError(format!(
                        "{} belongs to run '{}' variant '{}', not run '{}' variant '{}'",
                        path.display(),
                        found.run_id,
                        found.variant_id,
                        header.run_id,
                        header.variant_id
                    )));
                }
                (found, Self::replay(records))
            }
            Some(_) => {
                return Err(EvalError::CheckpointError(format!("{} has no header record", path.display())));
            }
        };

        debug!(
            path = %path.display(),
            completed = state.completed.len(),
            failed = state.failed.len(),
            "checkpoint: resumed"
        );
        Ok((
            Self {
                path,
                header,
                file: Mutex::new(file),
            },
            state,
        ))
    }

    /// Fold outcome records into state; the first outcome per query wins
    fn replay(records: impl Iterator<Item = CheckpointRecord>) -> CheckpointState {
        let mut seen = HashSet::new();
        let mut state = CheckpointState::default();
        for record in records {
            let Some(query_id) = record.query_id() else {
                continue;
            };
            if !seen.insert(query_id.to_string()) {
                continue;
            }
            match record {
                CheckpointRecord::Completed(result) => state.completed.push(result),
                CheckpointRecord::Failed(failed) => state.failed.push(failed),
                CheckpointRecord::Header(_) => {}
            }
        }
        state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &CheckpointHeader {
        &self.header
    }

    /// Append one record as a single line. Appends are serialized.
    pub async fn append(&self, record: &CheckpointRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line)
            .await
            .map_err(|e| EvalError::CheckpointError(format!("{}: append failed: {}", self.path.display(), e)))?;
        file.flush().await?;
        Ok(())
    }

    pub async fn record_completed(&self, result: &EvaluationResult) -> Result<()> {
        self.append(&CheckpointRecord::Completed(result.clone())).await
    }

    pub async fn record_failed(&self, query_id: &str, error: &str) -> Result<()> {
        self.append(&CheckpointRecord::Failed(FailedQuery {
            query_id: query_id.to_string(),
            error: error.to_string(),
        }))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MetricSet;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_path_ids_must_be_plain_names() {
        for bad in ["", ".", "..", "../x", "a/b", "a\\b", "x..y", "/abs"] {
            assert!(validate_path_id("variant", bad).unwrap_err().is_configuration(), "{bad:?}");
        }
        for good in ["baseline", "hybrid-bm25", "run_2024.10", "7f3c2a"] {
            assert!(validate_path_id("variant", good).is_ok(), "{good:?}");
        }
    }

    fn result(query_id: &str, ndcg: f64) -> EvaluationResult {
        EvaluationResult {
            query_id: query_id.to_string(),
            retrieved_docs: vec![],
            metrics: BTreeMap::from([(10, MetricSet { ndcg, ..Default::default() })]),
            usage_latency_ms: 1.5,
            stage_timings: BTreeMap::new(),
        }
    }

    fn header() -> CheckpointHeader {
        CheckpointHeader::new("run-1", "test", "baseline")
    }

    #[tokio::test]
    async fn test_reopen_recovers_outcomes() {
        let dir = TempDir::new().unwrap();
        let path = checkpoint_path(dir.path(), "run-1", "baseline");

        let (log, state) = CheckpointLog::open(&path, header()).await.unwrap();
        assert!(state.is_empty());
        log.record_completed(&result("q1", 0.25)).await.unwrap();
        log.record_failed("q2", "provider down").await.unwrap();
        drop(log);

        let (_, state) = CheckpointLog::open(&path, header()).await.unwrap();
        assert_eq!(state.completed, vec![result("q1", 0.25)]);
        assert_eq!(state.failed[0].query_id, "q2");
        assert_eq!(state.done_ids().len(), 2);
        assert_eq!(state.completed_ids().len(), 1);
    }

    #[tokio::test]
    async fn test_torn_trailing_line_is_cut() {
        let dir = TempDir::new().unwrap();
        let path = checkpoint_path(dir.path(), "run-1", "baseline");
        {
            let (log, _) = CheckpointLog::open(&path, header()).await.unwrap();
            log.record_completed(&result("q1", 1.0)).await.unwrap();
        }
        let mut contents = std::fs::read_to_string(&path).unwrap();
        contents.push_str(r#"{"completed":{"queryId":"q2","retr"#);
        std::fs::write(&path, &contents).unwrap();

        let (log, state) = CheckpointLog::open(&path, header()).await.unwrap();
        assert_eq!(state.completed.len(), 1);
        log.record_completed(&result("q2", 0.5)).await.unwrap();
        drop(log);

        let (_, state) = CheckpointLog::open(&path, header()).await.unwrap();
        let ids: Vec<_> = state.completed.iter().map(|r| r.query_id.as_str()).collect();
        assert_eq!(ids, vec!["q1", "q2"]);
    }

    #[tokio::test]
    async fn test_duplicate_outcomes_keep_first() {
        let dir = TempDir::new().unwrap();
        let path = checkpoint_path(dir.path(), "run-1", "baseline");
        let (log, _) = CheckpointLog::open(&path, header()).await.unwrap();
        log.record_completed(&result("q1", 0.1)).await.unwrap();
        log.record_completed(&result("q1", 0.9)).await.unwrap();
        drop(log);

        let (_, state) = CheckpointLog::open(&path, header()).await.unwrap();
        assert_eq!(state.completed, vec![result("q1", 0.1)]);
    }

    #[tokio::test]
    async fn test_other_variant_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.jsonl");
        CheckpointLog::open(&path, header()).await.unwrap();

        let other = CheckpointHeader::new("run-1", "test", "hybrid-bm25");
        assert!(matches!(
            CheckpointLog::open(&path, other).await.unwrap_err(),
            EvalError::CheckpointError(_)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_interleave() {
        let dir = TempDir::new().unwrap();
        let path = checkpoint_path(dir.path(), "run-1", "baseline");
        let (log, _) = CheckpointLog::open(&path, header()).await.unwrap();
        let log = Arc::new(log);

        let mut handles = Vec::new();
        for i in 0..32 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                log.record_completed(&result(&format!("q{i:02}"), i as f64)).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        drop(log);

        let (_, state) = CheckpointLog::open(&path, header()).await.unwrap();
        assert_eq!(state.completed.len(), 32);
    }
}
