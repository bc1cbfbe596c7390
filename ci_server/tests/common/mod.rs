//! Fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use push_ci::error::{ProcessError, ReportingError, StagingError};
use push_ci::models::{CommitState, PushEvent};
use push_ci::services::history::HistoryStore;
use push_ci::services::pipeline::Pipeline;
use push_ci::services::process::{CommandRunner, CommandSpec, ProcessOutput};
use push_ci::services::stager::{RepositoryStager, WorkingCopy};
use push_ci::services::test_runner::TestRunner;
use push_ci::services::validator::SyntaxValidator;

/// Stages by writing a fixed set of files into a fresh working copy.
pub struct FixtureStager {
    workspace: PathBuf,
    files: Vec<(String, Vec<u8>)>,
    pub staged_at: Mutex<Option<PathBuf>>,
}

impl FixtureStager {
    pub fn new(workspace: &Path, files: &[(&str, &str)]) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            files: files
                .iter()
                .map(|(p, c)| (p.to_string(), c.as_bytes().to_vec()))
                .collect(),
            staged_at: Mutex::new(None),
        }
    }
}

#[async_trait]
impl RepositoryStager for FixtureStager {
    async fn stage(&self, event: &PushEvent) -> Result<WorkingCopy, StagingError> {
        let copy = WorkingCopy::create_in(&self.workspace, &format!("build-{}-", event.short_sha()))?;
        for (rel, contents) in &self.files {
            let path = copy.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        }
        *self.staged_at.lock().unwrap() = Some(copy.path().to_path_buf());
        Ok(copy)
    }
}

/// Stager for an unreachable repository.
pub struct UnreachableStager;

#[async_trait]
impl RepositoryStager for UnreachableStager {
    async fn stage(&self, event: &PushEvent) -> Result<WorkingCopy, StagingError> {
        Err(StagingError::Clone {
            url: event.repository_url.clone(),
            branch: event.branch.clone(),
            stderr: "fatal: repository not found".to_string(),
        })
    }
}

/// Command runner that answers every command with a canned result.
pub struct ScriptedRunner {
    output: Option<ProcessOutput>,
    pub calls: AtomicUsize,
}

impl ScriptedRunner {
    pub fn exiting(code: i32) -> Self {
        Self {
            output: Some(ProcessOutput {
                exit_code: Some(code),
                ..Default::default()
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn timing_out() -> Self {
        Self {
            output: Some(ProcessOutput {
                timed_out: true,
                ..Default::default()
            }),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails to start any process.
    pub fn unlaunchable() -> Self {
        Self {
            output: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput, ProcessError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.output.clone().ok_or_else(|| ProcessError::Spawn {
            command: spec.display(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "bash not found"),
        })
    }
}

/// Stands in for the Python syntax checker: answers in the checker's report
/// format, flagging any file whose contents are one of `broken`.
pub struct FakePython {
    broken: Vec<String>,
}

impl FakePython {
    pub fn rejecting(broken: &[&str]) -> Self {
        Self {
            broken: broken.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl CommandRunner for FakePython {
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput, ProcessError> {
        let files = &spec.args[3..];
        let failures: Vec<_> = files
            .iter()
            .filter(|rel| {
                let contents = std::fs::read_to_string(spec.cwd.join(rel)).unwrap_or_default();
                self.broken.contains(&contents)
            })
            .map(|rel| serde_json::json!({ "path": rel, "error": "SyntaxError: invalid syntax" }))
            .collect();
        Ok(ProcessOutput {
            exit_code: Some(0),
            stdout: serde_json::json!({ "checked": files.len(), "failures": failures }).to_string(),
            ..Default::default()
        })
    }
}

/// Status reporter that remembers every call.
#[derive(Default)]
pub struct RecordingReporter {
    pub calls: Mutex<Vec<(String, CommitState, String)>>,
    pub reject: bool,
}

impl RecordingReporter {
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Default::default()
        }
    }

    pub fn states(&self) -> Vec<CommitState> {
        self.calls.lock().unwrap().iter().map(|(_, s, _)| *s).collect()
    }
}

#[async_trait]
impl push_ci::services::github_service::StatusReporter for RecordingReporter {
    async fn report(
        &self,
        _repo: Option<&str>,
        sha: &str,
        state: CommitState,
        description: &str,
    ) -> Result<(), ReportingError> {
        self.calls
            .lock()
            .unwrap()
            .push((sha.to_string(), state, description.to_string()));
        if self.reject {
            return Err(ReportingError::Rejected {
                status: 401,
                body: "Bad credentials".to_string(),
            });
        }
        Ok(())
    }
}

pub fn push_event(sha: &str) -> PushEvent {
    PushEvent {
        repository_url: "https://github.com/octo/hello.git".to_string(),
        repository: Some("octo/hello".to_string()),
        git_ref: "refs/heads/main".to_string(),
        branch: "main".to_string(),
        commit_sha: sha.to_string(),
    }
}

pub fn pipeline(
    stager: Arc<dyn RepositoryStager>,
    runner: Arc<dyn CommandRunner>,
    reporter: Arc<RecordingReporter>,
    history: HistoryStore,
) -> Pipeline {
    Pipeline::new(
        stager,
        syntax_validator(Arc::new(FakePython::rejecting(&[MISSING_COLON]))),
        TestRunner::new(runner, "python3 -m pytest", 5, Duration::from_secs(60)),
        reporter,
        history,
    )
}

pub fn syntax_validator(runner: Arc<dyn CommandRunner>) -> SyntaxValidator {
    SyntaxValidator::new(
        runner,
        "python3",
        BTreeSet::from(["test".to_string()]),
        Duration::from_secs(60),
    )
}

pub fn tool_available(program: &str) -> bool {
    std::process::Command::new(program)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub const VALID_SOURCE: &str = "def greet(name):\n    return f\"Hello, {name}!\"\n\nprint(greet(\"world\"))\n";
pub const MISSING_COLON: &str = "def greet(name)\n    return name\n";
