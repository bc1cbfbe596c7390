//! Build history — a JSON file mapping commit SHA to the last verdict for it.
//!
//! Writers are serialized and commit by writing a sibling temp file and
//! renaming it over the original, so a crash mid-write leaves the previous
//! file intact. Readers are served from an in-memory snapshot that is only
//! replaced after a write has been committed to disk.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::HistoryStoreError;
use crate::models::{BuildRecord, VerdictState};

/// On-disk value for one SHA. The SHA itself is the map key.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredBuild {
    timestamp: DateTime<Utc>,
    verdict: VerdictState,
    description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u64>,
}

type Snapshot = BTreeMap<String, StoredBuild>;

#[derive(Clone)]
pub struct HistoryStore {
    path: PathBuf,
    snapshot: Arc<RwLock<Arc<Snapshot>>>,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl HistoryStore {
    /// Open the history at `path`. A missing file is an empty history; a file
    /// that does not parse is an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, HistoryStoreError> {
        let path = path.into();
        let snapshot = match std::fs::read(&path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Snapshot::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| {
                HistoryStoreError::Corrupt {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::new(),
            Err(source) => return Err(HistoryStoreError::Io { path, source }),
        };

        tracing::info!(path = %path.display(), builds = snapshot.len(), "Build history loaded");

        Ok(Self {
            path,
            snapshot: Arc::new(RwLock::new(Arc::new(snapshot))),
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store `record`, replacing any earlier record for the same SHA.
    ///
    /// Returns only once the file on disk holds the new record.
    pub async fn record(&self, record: BuildRecord) -> Result<(), HistoryStoreError> {
        let _guard = self.write_lock.lock().await;

        let mut next = (*self.current()).clone();
        let sha = record.commit_sha.clone();
        next.insert(
            record.commit_sha,
            StoredBuild {
                timestamp: record.timestamp,
                verdict: record.verdict,
                description: record.description,
                branch: record.branch,
                duration_ms: record.duration_ms,
            },
        );

        let bytes = serde_json::to_vec_pretty(&next)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &bytes))
            .await
            .map_err(|e| HistoryStoreError::Io {
                path: self.path.clone(),
                source: std::io::Error::other(e),
            })??;

        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(next);
        tracing::debug!(sha = %sha, "Build recorded");
        Ok(())
    }

    /// Every recorded build, newest first; equal timestamps by SHA.
    pub fn list(&self) -> Vec<BuildRecord> {
        let snapshot = self.current();
        let mut records: Vec<BuildRecord> = snapshot
            .iter()
            .map(|(sha, stored)| to_record(sha, stored))
            .collect();
        records.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| a.commit_sha.cmp(&b.commit_sha))
        });
        records
    }

    pub fn get(&self, sha: &str) -> Option<BuildRecord> {
        self.current().get(sha).map(|stored| to_record(sha, stored))
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

fn to_record(sha: &str, stored: &StoredBuild) -> BuildRecord {
    BuildRecord {
        commit_sha: sha.to_string(),
        timestamp: stored.timestamp,
        verdict: stored.verdict,
        description: stored.description.clone(),
        branch: stored.branch.clone(),
        duration_ms: stored.duration_ms,
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), HistoryStoreError> {
    let io_err = |source: std::io::Error| HistoryStoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.write_all(b"\n").map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
