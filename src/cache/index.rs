//! Cache index and the actor task that owns it
//!
//! All index mutations (lookup recency bumps, inserts, evictions, prunes)
//! go through a single task, so eviction bookkeeping is never interleaved.
//! Blob bytes are read and written by callers outside the actor.
//!
//! The index file is rewritten every [`PERSIST_EVERY`] mutations, on flush
//! and when the actor shuts down. A blob written after the last persist has
//! no index entry on reopen and is never read.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

const INDEX_FILE: &str = "index.json";
const INDEX_VERSION: u32 = 1;

/// Mutations between automatic index writes
pub(crate) const PERSIST_EVERY: usize = 256;

/// One cached vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub size: u64,
    /// Logical clock value of the last access; larger is more recent
    pub last_accessed: u64,
    pub blob_file: String,
}

#[derive(Debug, Default, Deserialize)]
struct IndexFile {
    version: u32,
    clock: u64,
    entries: HashMap<String, IndexEntry>,
}

/// Borrowed view written to disk, so persisting never copies the entries
#[derive(Serialize)]
struct IndexFileRef<'a> {
    version: u32,
    clock: u64,
    entries: &'a HashMap<String, IndexEntry>,
}

/// A blob path handed out by a lookup, with the recency stamp it was read at
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BlobRef {
    pub path: PathBuf,
    pub stamp: u64,
}

/// Size-bounded LRU index over the blob directory
#[derive(Debug)]
pub(crate) struct CacheIndex {
    root: PathBuf,
    blob_dir: PathBuf,
    max_bytes: u64,
    clock: u64,
    total_bytes: u64,
    entries: HashMap<String, IndexEntry>,
    /// last_accessed -> key; clock values are unique
    by_recency: BTreeMap<u64, String>,
    pending: usize,
}

impl CacheIndex {
    /// Load the persisted index, starting empty if it is missing or unreadable
    pub(crate) fn load(root: &Path, blob_dir: &Path, max_bytes: u64) -> Self {
        let path = root.join(INDEX_FILE);
        let mut file = match fs::read_to_string(&path) {
            Ok(json) => match serde_json::from_str::<IndexFile>(&json) {
                Ok(file) if file.version == INDEX_VERSION => file,
                Ok(file) => {
                    warn!(version = file.version, "unsupported cache index version; starting empty");
                    IndexFile::default()
                }
                Err(e) => {
                    warn!(error = %e, "cache index unreadable; starting empty");
                    IndexFile::default()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => IndexFile::default(),
            Err(e) => {
                warn!(error = %e, "failed to read cache index; starting empty");
                IndexFile::default()
            }
        };

        // a hand-edited index may repeat stamps; renumber in order so they stay unique
        let mut ordered: Vec<(String, IndexEntry)> = file.entries.drain().collect();
        ordered.sort_by(|a, b| a.1.last_accessed.cmp(&b.1.last_accessed).then_with(|| a.0.cmp(&b.0)));
        let mut clock = file.clock;
        let mut entries = HashMap::with_capacity(ordered.len());
        let mut by_recency = BTreeMap::new();
        let mut total_bytes = 0;
        let mut last = 0;
        for (key, mut entry) in ordered {
            if entry.last_accessed <= last {
                entry.last_accessed = last + 1;
            }
            last = entry.last_accessed;
            clock = clock.max(last);
            total_bytes += entry.size;
            by_recency.insert(entry.last_accessed, key.clone());
            entries.insert(key, entry);
        }

        Self {
            root: root.to_path_buf(),
            blob_dir: blob_dir.to_path_buf(),
            max_bytes,
            clock,
            total_bytes,
            entries,
            by_recency,
            pending: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn mark_dirty(&mut self) {
        self.pending += 1;
    }

    fn remove_entry(&mut self, key: &str) -> Option<IndexEntry> {
        let entry = self.entries.remove(key)?;
        self.by_recency.remove(&entry.last_accessed);
        self.total_bytes -= entry.size;
        Some(entry)
    }

    /// Blob for a key, bumping its recency
    pub(crate) fn touch(&mut self, key: &str) -> Option<BlobRef> {
        if !self.entries.contains_key(key) {
            return None;
        }
        let now = self.tick();
        let entry = self.entries.get_mut(key)?;
        self.by_recency.remove(&entry.last_accessed);
        entry.last_accessed = now;
        let path = self.blob_dir.join(&entry.blob_file);
        self.by_recency.insert(now, key.to_string());
        self.mark_dirty();
        Some(BlobRef { path, stamp: now })
    }

    /// Drop an entry whose blob was missing or unreadable at `stamp`.
    ///
    /// An entry touched or rewritten since then is left alone.
    pub(crate) async fn prune(&mut self, key: &str, stamp: u64) -> bool {
        if self.entries.get(key).map(|e| e.last_accessed) != Some(stamp) {
            return false;
        }
        if let Some(entry) = self.remove_entry(key) {
            remove_blob(&self.blob_dir.join(&entry.blob_file)).await;
            self.mark_dirty();
        }
        true
    }

    /// Register a written blob, evicting least recently used entries first.
    ///
    /// Returns the keys that were evicted.
    pub(crate) async fn insert(&mut self, key: &str, size: u64, blob_file: String) -> Vec<String> {
        // same key means same blob file; only the entry is replaced
        self.remove_entry(key);

        let mut evicted = Vec::new();
        while self.total_bytes + size > self.max_bytes {
            let Some((_, oldest)) = self.by_recency.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&oldest) {
                self.total_bytes -= entry.size;
                remove_blob(&self.blob_dir.join(&entry.blob_file)).await;
            }
            debug!(key = %oldest, "evicted cache entry");
            evicted.push(oldest);
        }

        let now = self.tick();
        self.by_recency.insert(now, key.to_string());
        self.entries.insert(
            key.to_string(),
            IndexEntry {
                size,
                last_accessed: now,
                blob_file,
            },
        );
        self.total_bytes += size;
        self.mark_dirty();
        evicted
    }

    /// Remove every entry and every file in the blob directory
    pub(crate) async fn clear(&mut self) -> io::Result<()> {
        self.entries.clear();
        self.by_recency.clear();
        self.total_bytes = 0;

        let mut dir = tokio::fs::read_dir(&self.blob_dir).await?;
        while let Some(item) = dir.next_entry().await? {
            remove_blob(&item.path()).await;
        }
        self.mark_dirty();
        self.persist().await
    }

    /// Write the index atomically if anything changed since the last write
    pub(crate) async fn persist(&mut self) -> io::Result<()> {
        if self.pending == 0 {
            return Ok(());
        }
        let json = serde_json::to_vec(&IndexFileRef {
            version: INDEX_VERSION,
            clock: self.clock,
            entries: &self.entries,
        })?;
        let tmp = self.root.join(format!("{INDEX_FILE}.tmp"));
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, self.root.join(INDEX_FILE)).await?;
        self.pending = 0;
        Ok(())
    }

    /// Persist once enough mutations have accumulated
    pub(crate) async fn maybe_persist(&mut self) -> io::Result<()> {
        if self.pending >= PERSIST_EVERY {
            self.persist().await
        } else {
            Ok(())
        }
    }

    pub(crate) fn stats(&self) -> (usize, u64, u64) {
        (self.entries.len(), self.total_bytes, self.max_bytes)
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

async fn remove_blob(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove cache blob"),
    }
}

/// Requests handled by the index actor
pub(crate) enum IndexCommand {
    Lookup {
        key: String,
        reply: oneshot::Sender<Option<BlobRef>>,
    },
    Prune {
        key: String,
        stamp: u64,
    },
    Insert {
        key: String,
        size: u64,
        blob_file: String,
        reply: oneshot::Sender<Vec<String>>,
    },
    Stats {
        reply: oneshot::Sender<(usize, u64, u64)>,
    },
    Clear {
        reply: oneshot::Sender<io::Result<()>>,
    },
    Flush {
        reply: oneshot::Sender<io::Result<()>>,
    },
}

/// Run the index actor until every handle is dropped
pub(crate) async fn run_index_actor(mut index: CacheIndex, mut rx: mpsc::Receiver<IndexCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            IndexCommand::Lookup { key, reply } => {
                let _ = reply.send(index.touch(&key));
            }
            IndexCommand::Prune { key, stamp } => {
                if !index.prune(&key, stamp).await {
                    debug!(key = %key, "cache entry changed since lookup; not pruned");
                }
            }
            IndexCommand::Insert {
                key,
                size,
                blob_file,
                reply,
            } => {
                let _ = reply.send(index.insert(&key, size, blob_file).await);
            }
            IndexCommand::Stats { reply } => {
                let _ = reply.send(index.stats());
            }
            IndexCommand::Clear { reply } => {
                let _ = reply.send(index.clear().await);
            }
            IndexCommand::Flush { reply } => {
                let _ = reply.send(index.persist().await);
            }
        }
        if let Err(e) = index.maybe_persist().await {
            warn!(error = %e, "failed to persist cache index");
        }
    }

    if let Err(e) = index.persist().await {
        warn!(error = %e, "failed to persist cache index on shutdown");
    }
}
