//! Content-addressed embedding cache
//!
//! Maps `(provider, model, text)` to a vector stored as one blob file per
//! key: 8 bytes per dimension, little-endian IEEE-754 doubles, no framing.
//! An index file tracks blob sizes and recency; once the tracked total would
//! pass `max_bytes`, least recently used entries are evicted first.
//!
//! # Consistency
//!
//! An index entry without a readable blob is a miss: the entry is pruned
//! and the lookup returns `None`. A blob without an index entry is never
//! read. Index mutations are serialized by a single actor task (see
//! [`index`]); blob reads and writes for distinct keys run in parallel.

pub mod index;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::errors::{EvalError, Result};
use index::{run_index_actor, CacheIndex, IndexCommand};

const BLOB_DIR: &str = "blobs";
const COMMAND_BUFFER: usize = 256;

/// Cache statistics snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub max_bytes: u64,
    pub hits: u64,
    pub misses: u64,
}

/// Deterministic key for a provider/model/text triple.
///
/// Each component is length-prefixed so distinct triples never collide on
/// concatenation.
pub fn cache_key(provider: &str, model: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [provider, model, text] {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Fixed-width encoding: one 8-byte little-endian double per dimension
pub fn encode_vector(vector: &[f64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 8);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Inverse of [`encode_vector`]; `None` if the length is not a multiple of 8
pub fn decode_vector(bytes: &[u8]) -> Option<Vec<f64>> {
    if bytes.len() % 8 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(chunk);
                f64::from_le_bytes(buf)
            })
            .collect(),
    )
}

/// Handle to an on-disk embedding cache. Cheap to clone; clones share the index.
#[derive(Debug, Clone)]
pub struct EmbeddingCache {
    tx: mpsc::Sender<IndexCommand>,
    blob_dir: PathBuf,
    max_bytes: u64,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl EmbeddingCache {
    /// Open (or create) a cache rooted at `dir` and start its index actor.
    ///
    /// Must be called inside a tokio runtime.
    pub async fn open(dir: impl AsRef<Path>, max_bytes: u64) -> Result<Self> {
        if max_bytes == 0 {
            return Err(EvalError::ConfigError("cache max_bytes must be > 0".into()));
        }
        let root = dir.as_ref().to_path_buf();
        let blob_dir = root.join(BLOB_DIR);
        tokio::fs::create_dir_all(&blob_dir).await?;

        let index = CacheIndex::load(&root, &blob_dir, max_bytes);
        let (entries, total, _) = index.stats();
        debug!(dir = %root.display(), entries, total_bytes = total, "opened embedding cache");

        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        tokio::spawn(run_index_actor(index, rx));

        Ok(Self {
            tx,
            blob_dir,
            max_bytes,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        })
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> IndexCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| EvalError::CacheError("cache index actor stopped".into()))?;
        rx.await
            .map_err(|_| EvalError::CacheError("cache index actor dropped request".into()))
    }

    fn record_miss(&self) -> Option<Vec<f64>> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Cached vector for the triple, or `None`. Never fails.
    pub async fn get(&self, text: &str, provider: &str, model: &str) -> Option<Vec<f64>> {
        let key = cache_key(provider, model, text);
        let blob = match self.request(|reply| IndexCommand::Lookup { key: key.clone(), reply }).await {
            Ok(Some(blob)) => blob,
            Ok(None) => return self.record_miss(),
            Err(e) => {
                warn!(error = %e, "cache lookup failed; treating as miss");
                return self.record_miss();
            }
        };

        let bytes = match tokio::fs::read(&blob.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "cache blob missing; pruning index entry");
                let _ = self.tx.send(IndexCommand::Prune { key, stamp: blob.stamp }).await;
                return self.record_miss();
            }
        };

        match decode_vector(&bytes) {
            Some(vector) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(vector)
            }
            None => {
                warn!(key = %key, len = bytes.len(), "cache blob corrupt; pruning index entry");
                let _ = self.tx.send(IndexCommand::Prune { key, stamp: blob.stamp }).await;
                self.record_miss()
            }
        }
    }

    /// Store a vector, evicting older entries if the size cap requires it
    pub async fn set(&self, text: &str, provider: &str, model: &str, vector: &[f64]) -> Result<()> {
        let bytes = encode_vector(vector);
        let size = bytes.len() as u64;
        if size > self.max_bytes {
            debug!(size, max_bytes = self.max_bytes, "vector larger than cache; not cached");
            return Ok(());
        }

        let key = cache_key(provider, model, text);
        let blob_file = format!("{key}.bin");
        let tmp = self
            .blob_dir
            .join(format!("{blob_file}.{}.tmp", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, self.blob_dir.join(&blob_file)).await?;

        let evicted = self
            .request(|reply| IndexCommand::Insert {
                key,
                size,
                blob_file,
                reply,
            })
            .await?;
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "cache eviction");
        }
        Ok(())
    }

    /// Element-wise [`get`](Self::get)
    pub async fn get_batch(&self, texts: &[String], provider: &str, model: &str) -> Vec<Option<Vec<f64>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.get(text, provider, model).await);
        }
        out
    }

    /// Element-wise [`set`](Self::set)
    pub async fn set_batch(
        &self,
        texts: &[String],
        provider: &str,
        model: &str,
        vectors: &[Vec<f64>],
    ) -> Result<()> {
        if texts.len() != vectors.len() {
            return Err(EvalError::CacheError(format!(
                "set_batch got {} texts but {} vectors",
                texts.len(),
                vectors.len()
            )));
        }
        for (text, vector) in texts.iter().zip(vectors) {
            self.set(text, provider, model, vector).await?;
        }
        Ok(())
    }

    /// Remove every cached vector
    pub async fn clear(&self) -> Result<()> {
        self.request(|reply| IndexCommand::Clear { reply }).await??;
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        Ok(())
    }

    /// Write the index now instead of waiting for the next batch of mutations
    pub async fn flush(&self) -> Result<()> {
        self.request(|reply| IndexCommand::Flush { reply }).await??;
        Ok(())
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let (entries, total_bytes, max_bytes) = self.request(|reply| IndexCommand::Stats { reply }).await?;
        Ok(CacheStats {
            entries,
            total_bytes,
            max_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        })
    }
}
