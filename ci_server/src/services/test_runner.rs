//! Test runner adapter — runs the project's test command inside a working
//! copy and classifies the aggregate outcome.

use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;

use crate::error::TestRunnerError;
use crate::models::{PushEvent, TestOutcome, TestResult};
use crate::services::process::{CommandRunner, CommandSpec, ProcessOutput};

/// Output lines that mean the tool found nothing to run, for tools that
/// exit 0 in that case.
static NO_TESTS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)\bno tests ran\b|\bcollected 0 items\b").unwrap());

pub struct TestRunner {
    runner: Arc<dyn CommandRunner>,
    command: String,
    no_tests_exit_code: i32,
    timeout: Duration,
}

impl TestRunner {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        command: impl Into<String>,
        no_tests_exit_code: i32,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            command: command.into(),
            no_tests_exit_code,
            timeout,
        }
    }

    /// Run the test command rooted at `root`.
    pub async fn run_tests(
        &self,
        root: &Path,
        event: &PushEvent,
    ) -> Result<TestResult, TestRunnerError> {
        if self.command.trim().is_empty() {
            return Err(TestRunnerError::EmptyCommand);
        }

        tracing::info!(command = %self.command, "Running test suite");

        let spec = CommandSpec::new("bash", root, self.timeout)
            .args(["-c", self.command.as_str()])
            .env("CI", "true")
            .env("CI_COMMIT", &event.commit_sha)
            .env("CI_BRANCH", &event.branch);
        let output = self.runner.run(&spec).await?;

        Ok(self.classify(output))
    }

    /// Map process output onto a test outcome.
    pub fn classify(&self, output: ProcessOutput) -> TestResult {
        let (outcome, detail) = if output.timed_out {
            (
                TestOutcome::SomeFailed,
                Some(format!(
                    "test run timed out after {}s",
                    self.timeout.as_secs()
                )),
            )
        } else {
            match output.exit_code {
                Some(code) if code == self.no_tests_exit_code => {
                    (TestOutcome::NoTestsFound, Some("no tests were collected".to_string()))
                }
                Some(0) if NO_TESTS_REGEX.is_match(&output.stdout) => {
                    (TestOutcome::NoTestsFound, Some("no tests were collected".to_string()))
                }
                Some(0) => (TestOutcome::AllPassed, None),
                Some(code) => (
                    TestOutcome::SomeFailed,
                    Some(format!("test command exited with code {code}")),
                ),
                None => (
                    TestOutcome::SomeFailed,
                    Some("test command was killed by a signal".to_string()),
                ),
            }
        };

        crate::metrics::step_duration("test", output.duration_ms);

        TestResult {
            outcome,
            exit_code: output.exit_code,
            timed_out: output.timed_out,
            stdout: output.stdout,
            stderr: output.stderr,
            duration_ms: output.duration_ms,
            detail,
        }
    }
}
