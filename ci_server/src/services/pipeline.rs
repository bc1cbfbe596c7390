//! Build pipeline — runs one push event through staging, syntax check, tests,
//! verdict, status report and history.
//!
//! Every error of a run is contained in that run. The working copy is
//! released before the run reaches `Done` or `Failed`.

use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;
use uuid::Uuid;

use crate::config::CiConfig;
use crate::events::{BuildLifecycle, BuildStage};
use crate::models::{BuildRecord, BuildVerdict, CommitState, PushEvent, TestResult, VerdictState};
use crate::services::github_service::{GithubStatusReporter, StatusReporter};
use crate::services::history::HistoryStore;
use crate::services::process::{CommandRunner, ShellRunner};
use crate::services::stager::{GitStager, RepositoryStager};
use crate::services::test_runner::TestRunner;
use crate::services::validator::SyntaxValidator;
use crate::services::verdict;

/// What happened to one build, returned to the caller and logged.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub run_id: Uuid,
    pub commit_sha: String,
    pub verdict: BuildVerdict,
    pub stage: BuildStage,
    /// Stages entered, in order.
    pub stages: Vec<&'static str>,
    /// Final commit status was accepted by the platform.
    pub reported: bool,
    /// Build record was committed to the history file.
    pub recorded: bool,
    pub duration_ms: u64,
}

pub struct Pipeline {
    stager: Arc<dyn RepositoryStager>,
    validator: SyntaxValidator,
    test_runner: TestRunner,
    reporter: Arc<dyn StatusReporter>,
    history: HistoryStore,
}

impl Pipeline {
    pub fn new(
        stager: Arc<dyn RepositoryStager>,
        validator: SyntaxValidator,
        test_runner: TestRunner,
        reporter: Arc<dyn StatusReporter>,
        history: HistoryStore,
    ) -> Self {
        Self {
            stager,
            validator,
            test_runner,
            reporter,
            history,
        }
    }

    /// Wire the production collaborators: `git`, the Python interpreter,
    /// the configured test command, and the GitHub status API.
    pub fn from_config(config: &CiConfig, history: HistoryStore) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(ShellRunner);
        let stager = GitStager::new(
            runner.clone(),
            config.workspace_dir.clone(),
            config.clone_timeout,
        );
        let validator = SyntaxValidator::new(
            runner.clone(),
            config.python.clone(),
            config.excluded_dirs.clone(),
            config.syntax_timeout,
        );
        let test_runner = TestRunner::new(
            runner,
            config.test_command.clone(),
            config.no_tests_exit_code,
            config.test_timeout,
        );
        Self::new(
            Arc::new(stager),
            validator,
            test_runner,
            Arc::new(GithubStatusReporter::from_config(config)),
            history,
        )
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Run the whole pipeline for `event`. Never fails: every outcome,
    /// including infrastructure errors, ends in a verdict.
    pub async fn run(&self, event: PushEvent) -> BuildReport {
        self.run_as(Uuid::new_v4(), event).await
    }

    /// As [`Pipeline::run`], under a caller-chosen run id.
    pub async fn run_as(&self, run_id: Uuid, event: PushEvent) -> BuildReport {
        let span = tracing::info_span!(
            "build",
            %run_id,
            commit_sha = %event.short_sha(),
            branch = %event.branch
        );
        self.execute(run_id, &event).instrument(span).await
    }

    async fn execute(&self, run_id: Uuid, event: &PushEvent) -> BuildReport {
        let start = Instant::now();
        let mut lifecycle = BuildLifecycle::new();
        tracing::info!(repo = %event.repository_url, "Build received");
        crate::metrics::build_status_changed("pending");

        self.post_status(event, CommitState::Pending, "Build started").await;

        let copy = match self.stager.stage(event).await {
            Ok(copy) => copy,
            Err(e) => {
                tracing::error!("Staging failed: {e}");
                crate::metrics::error_recorded("staging");
                lifecycle.fail(format!("staging: {e}"));
                let verdict = BuildVerdict::new(
                    VerdictState::Error,
                    format!("Could not stage commit {}: {e}", event.short_sha()),
                );
                return self.conclude(run_id, event, lifecycle, verdict, start).await;
            }
        };
        lifecycle.advance(BuildStage::Staged);

        let step_start = Instant::now();
        let validation = match self.validator.validate(copy.path()).await {
            Ok(validation) => validation,
            Err(e) => {
                tracing::error!("Syntax check could not run: {e}");
                crate::metrics::error_recorded("validation");
                drop(copy);
                lifecycle.fail(format!("syntax check: {e}"));
                let verdict = BuildVerdict::new(
                    VerdictState::Error,
                    format!("Syntax check could not run: {e}"),
                );
                return self.conclude(run_id, event, lifecycle, verdict, start).await;
            }
        };
        crate::metrics::step_duration("syntax", step_start.elapsed().as_millis() as u64);
        lifecycle.advance(BuildStage::Validated);

        let tests = if validation.is_clean() {
            let result = match self.test_runner.run_tests(copy.path(), event).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("Test runner failed: {e}");
                    crate::metrics::error_recorded("test_runner");
                    TestResult::runner_failure(format!("test runner failed: {e}"))
                }
            };
            tracing::info!(
                outcome = ?result.outcome,
                exit_code = ?result.exit_code,
                duration_ms = result.duration_ms,
                "Test suite finished"
            );
            lifecycle.advance(BuildStage::Tested);
            Some(result)
        } else {
            tracing::info!(
                errors = validation.error_count,
                "Syntax errors found, skipping tests"
            );
            None
        };

        let verdict = verdict::resolve(&validation, tests.as_ref());
        lifecycle.advance(BuildStage::Resolved);

        drop(copy);
        self.conclude(run_id, event, lifecycle, verdict, start).await
    }

    /// Publish and persist `verdict`, then close the lifecycle.
    ///
    /// Status reporting and history recording are attempted independently;
    /// neither failure prevents the other.
    async fn conclude(
        &self,
        run_id: Uuid,
        event: &PushEvent,
        mut lifecycle: BuildLifecycle,
        verdict: BuildVerdict,
        start: Instant,
    ) -> BuildReport {
        let duration_ms = start.elapsed().as_millis() as u64;
        let record = BuildRecord::new(&event.commit_sha, &verdict)
            .with_branch(&event.branch)
            .with_duration_ms(duration_ms);

        let (reported, recorded) = tokio::join!(
            self.post_status(event, verdict.state().into(), verdict.description()),
            self.history.record(record),
        );
        let recorded = match recorded {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to record build history: {e}");
                crate::metrics::error_recorded("history");
                false
            }
        };

        if !lifecycle.stage().is_terminal() {
            lifecycle.advance(BuildStage::Reported);
            lifecycle.advance(BuildStage::Done);
        }

        crate::metrics::build_status_changed(verdict.state().as_str());
        crate::metrics::build_duration(duration_ms);
        tracing::info!(
            verdict = %verdict.state(),
            description = verdict.description(),
            stage = %lifecycle.stage(),
            reported,
            recorded,
            duration_ms,
            "Build finished"
        );

        BuildReport {
            run_id,
            commit_sha: event.commit_sha.clone(),
            stage: lifecycle.stage().clone(),
            stages: lifecycle.history().to_vec(),
            verdict,
            reported,
            recorded,
            duration_ms,
        }
    }

    /// Best-effort status update. Failures are logged, never propagated.
    async fn post_status(&self, event: &PushEvent, state: CommitState, description: &str) -> bool {
        match self
            .reporter
            .report(
                event.repository.as_deref(),
                &event.commit_sha,
                state,
                description,
            )
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(state = state.as_str(), "Commit status update failed: {e}");
                crate::metrics::error_recorded("reporting");
                false
            }
        }
    }
}
