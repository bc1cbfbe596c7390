//! ci.test_result — Aggregate outcome of one test-suite run.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    AllPassed,
    SomeFailed,
    NoTestsFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    pub outcome: TestOutcome,
    /// Process exit code; `None` when killed or never started.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    /// Short human-readable explanation when the outcome is not `AllPassed`.
    pub detail: Option<String>,
}

impl TestResult {
    /// A run that could not produce an outcome of its own (launch failure).
    pub fn runner_failure(detail: impl Into<String>) -> Self {
        Self {
            outcome: TestOutcome::SomeFailed,
            exit_code: None,
            timed_out: false,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 0,
            detail: Some(detail.into()),
        }
    }
}
