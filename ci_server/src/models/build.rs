//! ci.build — Verdict and persisted record of one pipeline run.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal outcome of a build.
///
/// A syntax problem is a `Failure`; missing or failing tests are an `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictState {
    Success,
    Error,
    Failure,
}

impl VerdictState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictState::Success => "success",
            VerdictState::Error => "error",
            VerdictState::Failure => "failure",
        }
    }
}

impl fmt::Display for VerdictState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State accepted by the commit status API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    Pending,
    Success,
    Failure,
    Error,
}

impl CommitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitState::Pending => "pending",
            CommitState::Success => "success",
            CommitState::Failure => "failure",
            CommitState::Error => "error",
        }
    }
}

impl From<VerdictState> for CommitState {
    fn from(state: VerdictState) -> Self {
        match state {
            VerdictState::Success => CommitState::Success,
            VerdictState::Error => CommitState::Error,
            VerdictState::Failure => CommitState::Failure,
        }
    }
}

/// The single verdict of a build. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildVerdict {
    state: VerdictState,
    description: String,
}

impl BuildVerdict {
    pub fn new(state: VerdictState, description: impl Into<String>) -> Self {
        Self {
            state,
            description: description.into(),
        }
    }

    pub fn state(&self) -> VerdictState {
        self.state
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// One entry of the build history, keyed by commit SHA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub commit_sha: String,
    pub timestamp: DateTime<Utc>,
    pub verdict: VerdictState,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl BuildRecord {
    pub fn new(commit_sha: impl Into<String>, verdict: &BuildVerdict) -> Self {
        Self {
            commit_sha: commit_sha.into(),
            timestamp: Utc::now(),
            verdict: verdict.state(),
            description: verdict.description().to_string(),
            branch: None,
            duration_ms: None,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}
