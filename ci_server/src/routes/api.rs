//! REST API over the build history.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{BuildRecord, VerdictState};
use crate::services::history::HistoryStore;

/// JSON response for one build.
#[derive(Debug, Serialize)]
pub struct BuildJson {
    pub commit_sha: String,
    pub timestamp: DateTime<Utc>,
    pub verdict: VerdictState,
    pub description: String,
    pub branch: Option<String>,
    pub duration_ms: Option<u64>,
}

impl From<BuildRecord> for BuildJson {
    fn from(record: BuildRecord) -> Self {
        Self {
            commit_sha: record.commit_sha,
            timestamp: record.timestamp,
            verdict: record.verdict,
            description: record.description,
            branch: record.branch,
            duration_ms: record.duration_ms,
        }
    }
}

/// All builds, newest first.
pub fn list_builds(history: &HistoryStore) -> Vec<BuildJson> {
    history.list().into_iter().map(BuildJson::from).collect()
}

pub fn get_build(history: &HistoryStore, sha: &str) -> Option<BuildJson> {
    history.get(sha).map(BuildJson::from)
}
