//! Filesystem-backed checkpoint store.
//!
//! Layout: `<root>/<sha256(query_id)>/<timestamp>-<checkpoint_id>.json`.
//! Hashing the id gives every query a fixed-length directory name whatever
//! characters the id contains. Timestamps are zero-padded so lexical file
//! order is capture order. Each record carries a SHA-256 of its execution
//! context, verified on every read.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{next_timestamp, Checkpoint, CheckpointDraft, CheckpointId, CheckpointStore, StorageError};
use crate::query::QueryId;

const FORMAT_VERSION: u32 = 1;
const EXTENSION: &str = "json";

#[derive(Serialize, Deserialize)]
struct StoredCheckpoint {
    format_version: u32,
    context_sha256: String,
    checkpoint: Checkpoint,
}

/// Durable store writing one JSON file per checkpoint.
pub struct FileCheckpointStore {
    root: PathBuf,
    /// Newest timestamp per query, loaded lazily from disk. The mutex also
    /// serializes writers and pruners of the same query directory.
    last_timestamp: DashMap<QueryId, Arc<Mutex<Option<u64>>>>,
}

impl FileCheckpointStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), "file checkpoint store opened");
        Ok(Self {
            root,
            last_timestamp: DashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the checkpoints of `query_id`.
    pub fn query_dir(&self, query_id: &QueryId) -> PathBuf {
        self.root.join(dir_name(query_id))
    }

    fn query_lock(&self, query_id: &QueryId) -> Arc<Mutex<Option<u64>>> {
        self.last_timestamp
            .entry(query_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Checkpoint file names in `dir`, oldest first. Missing dir is empty.
    async fn list_files(dir: &Path) -> Result<Vec<String>, StorageError> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if parse_file_name(&name).is_some() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    async fn read_file(path: &Path) -> Result<Checkpoint, StorageError> {
        let bytes = tokio::fs::read(path).await?;
        let stored: StoredCheckpoint = serde_json::from_slice(&bytes)?;
        if stored.format_version != FORMAT_VERSION {
            return Err(StorageError::Unavailable(format!(
                "unsupported checkpoint format version {}",
                stored.format_version
            )));
        }
        let actual = stored.checkpoint.execution_context.digest();
        if actual != stored.context_sha256 {
            return Err(StorageError::ChecksumMismatch {
                checkpoint_id: stored.checkpoint.id.to_string(),
                expected: stored.context_sha256,
                actual,
            });
        }
        Ok(stored.checkpoint)
    }
}

fn dir_name(query_id: &QueryId) -> String {
    hex::encode(Sha256::digest(query_id.as_str().as_bytes()))
}

fn file_name(timestamp: u64, id: &CheckpointId) -> String {
    format!("{:020}-{}.{}", timestamp, id, EXTENSION)
}

/// Split `<timestamp>-<id>.json` into its parts.
fn parse_file_name(name: &str) -> Option<(u64, &str)> {
    let stem = name.strip_suffix(EXTENSION)?.strip_suffix('.')?;
    let (ts, id) = stem.split_once('-')?;
    let ts = ts.parse().ok()?;
    if id.is_empty() {
        return None;
    }
    Some((ts, id))
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn create_checkpoint(&self, draft: CheckpointDraft) -> Result<Checkpoint, StorageError> {
        let dir = self.query_dir(&draft.query_id);
        let lock = self.query_lock(&draft.query_id);
        let mut last = lock.lock().await;

        tokio::fs::create_dir_all(&dir).await?;
        if last.is_none() {
            *last = Self::list_files(&dir)
                .await?
                .iter()
                .filter_map(|n| parse_file_name(n).map(|(ts, _)| ts))
                .max();
        }

        let checkpoint = draft.seal(CheckpointId::generate(), next_timestamp(*last));
        let stored = StoredCheckpoint {
            format_version: FORMAT_VERSION,
            context_sha256: checkpoint.execution_context.digest(),
            checkpoint,
        };
        let bytes = serde_json::to_vec_pretty(&stored)?;

        let final_path = dir.join(file_name(stored.checkpoint.timestamp, &stored.checkpoint.id));
        let tmp_path = final_path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;

        *last = Some(stored.checkpoint.timestamp);
        Ok(stored.checkpoint)
    }

    async fn get_checkpoints(&self, query_id: &QueryId) -> Result<Vec<Checkpoint>, StorageError> {
        let dir = self.query_dir(query_id);
        let mut checkpoints = Vec::new();
        for name in Self::list_files(&dir).await? {
            checkpoints.push(Self::read_file(&dir.join(name)).await?);
        }
        Ok(checkpoints)
    }

    async fn get_checkpoint(
        &self,
        query_id: &QueryId,
        checkpoint_id: &CheckpointId,
    ) -> Result<Checkpoint, StorageError> {
        let dir = self.query_dir(query_id);
        let name = Self::list_files(&dir)
            .await?
            .into_iter()
            .find(|n| parse_file_name(n).is_some_and(|(_, id)| id == checkpoint_id.as_str()))
            .ok_or_else(|| StorageError::not_found(checkpoint_id.as_str()))?;
        Self::read_file(&dir.join(name)).await
    }

    async fn prune(&self, query_id: &QueryId, keep_latest: usize) -> Result<usize, StorageError> {
        let dir = self.query_dir(query_id);
        let lock = self.query_lock(query_id);
        let _guard = lock.lock().await;

        let names = Self::list_files(&dir).await?;
        if names.len() <= keep_latest {
            return Ok(0);
        }
        let stale = names.len() - keep_latest;
        for name in &names[..stale] {
            if let Err(e) = tokio::fs::remove_file(dir.join(name)).await {
                warn!(query_id = %query_id, file = %name, error = %e, "failed to prune checkpoint");
                return Err(e.into());
            }
        }
        Ok(stale)
    }

    fn backend(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_round_trip() {
        let id = CheckpointId::from("3f2a-bc");
        let name = file_name(42, &id);
        assert_eq!(name, "00000000000000000042-3f2a-bc.json");
        assert_eq!(parse_file_name(&name), Some((42, "3f2a-bc")));
    }

    #[test]
    fn test_dir_name_is_fixed_length_hex() {
        let long = "x".repeat(300);
        for id in ["q1", "a/b", "../escape", "user 42", ".hidden", long.as_str()] {
            let name = dir_name(&QueryId::from(id));
            assert_eq!(name.len(), 64);
            assert!(name.chars().all(|c| c.is_ascii_hexdigit()));
        }
        assert_ne!(dir_name(&QueryId::from("a/b")), dir_name(&QueryId::from("a_b")));
    }

    #[test]
    fn test_parse_rejects_foreign_files() {
        assert_eq!(parse_file_name("notes.txt"), None);
        assert_eq!(parse_file_name("abc-def.json"), None);
        assert_eq!(parse_file_name("00000000000000000042-x.tmp"), None);
        assert_eq!(parse_file_name("00000000000000000042-.json"), None);
    }
}
