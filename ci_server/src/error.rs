//! Error types for each stage of a build and for process startup.

use std::path::PathBuf;

use thiserror::Error;

/// Startup configuration errors. These abort the server before it binds.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("CI_GITHUB_TOKEN is not set; commit status reporting requires an access token")]
    MissingToken,

    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Failure to produce a working copy for a push event.
#[derive(Error, Debug)]
pub enum StagingError {
    #[error("failed to create workspace directory {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("git clone of {url} (branch {branch}) failed: {stderr}")]
    Clone {
        url: String,
        branch: String,
        stderr: String,
    },

    #[error("commit {sha} not found on branch {branch}: {stderr}")]
    UnknownRef {
        sha: String,
        branch: String,
        stderr: String,
    },

    #[error("{step} timed out after {secs}s")]
    Timeout { step: &'static str, secs: u64 },

    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// The syntax check itself could not be carried out. Individual files that
/// fail to parse are not errors; they are counted in the result.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("syntax checker `{command}` failed (exit {exit_code:?}): {stderr}")]
    Checker {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("syntax check timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("syntax checker reported {checked} of {expected} files")]
    Incomplete { expected: usize, checked: usize },

    #[error("unreadable syntax checker report: {0}")]
    Output(#[from] serde_json::Error),

    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Failure of the external process layer itself, not of the command it ran.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting on `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum TestRunnerError {
    #[error("test command is empty")]
    EmptyCommand,

    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Commit status could not be published.
#[derive(Error, Debug)]
pub enum ReportingError {
    #[error("push event carries no repository name; cannot address the status API")]
    MissingRepository,

    #[error("status API rejected the request: {status} {body}")]
    Rejected { status: u16, body: String },

    #[error("status API request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum HistoryStoreError {
    #[error("history file I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("history file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialise history: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A webhook body that claims to be a push but lacks what a build needs.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PayloadError {
    #[error("push payload is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("push payload field `{field}` has an invalid value: {value:?}")]
    InvalidField { field: &'static str, value: String },
}
