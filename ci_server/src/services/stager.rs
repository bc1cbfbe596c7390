//! Repository staging — clones the pushed branch into a disposable working
//! copy and checks out the exact commit of the push.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::error::StagingError;
use crate::models::PushEvent;
use crate::services::process::{CommandRunner, CommandSpec};

/// An isolated checkout of one commit. The directory is removed when the
/// value is dropped, on every exit path of a build.
#[derive(Debug)]
pub struct WorkingCopy {
    dir: TempDir,
}

impl WorkingCopy {
    /// Create an empty, uniquely-named working copy under `parent`.
    pub fn create_in(parent: &Path, prefix: &str) -> Result<Self, StagingError> {
        std::fs::create_dir_all(parent).map_err(|source| StagingError::Workspace {
            path: parent.to_path_buf(),
            source,
        })?;
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(parent)
            .map_err(|source| StagingError::Workspace {
                path: parent.to_path_buf(),
                source,
            })?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

#[async_trait]
pub trait RepositoryStager: Send + Sync {
    /// Produce a working copy holding the tree of `event.commit_sha`.
    async fn stage(&self, event: &PushEvent) -> Result<WorkingCopy, StagingError>;
}

/// Stages by shelling out to `git`.
pub struct GitStager {
    runner: Arc<dyn CommandRunner>,
    workspace_dir: PathBuf,
    timeout: Duration,
}

impl GitStager {
    pub fn new(runner: Arc<dyn CommandRunner>, workspace_dir: PathBuf, timeout: Duration) -> Self {
        Self {
            runner,
            workspace_dir,
            timeout,
        }
    }

    fn git(&self, cwd: &Path) -> CommandSpec {
        CommandSpec::new("git", cwd, self.timeout)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_ASKPASS", "true")
    }
}

#[async_trait]
impl RepositoryStager for GitStager {
    async fn stage(&self, event: &PushEvent) -> Result<WorkingCopy, StagingError> {
        let prefix = format!("build-{}-", event.short_sha());
        let copy = WorkingCopy::create_in(&self.workspace_dir, &prefix)?;
        let dest = copy.path().to_string_lossy().to_string();

        tracing::debug!(
            url = %event.repository_url,
            branch = %event.branch,
            dest = %dest,
            "Cloning repository"
        );

        let clone = self
            .git(&self.workspace_dir)
            .args(["clone", "--quiet", "--single-branch", "--branch"])
            .arg(&event.branch)
            .arg("--")
            .arg(&event.repository_url)
            .arg(&dest);
        let output = self.runner.run(&clone).await?;
        if output.timed_out {
            return Err(StagingError::Timeout {
                step: "git clone",
                secs: self.timeout.as_secs(),
            });
        }
        if !output.success() {
            return Err(StagingError::Clone {
                url: event.repository_url.clone(),
                branch: event.branch.clone(),
                stderr: output.stderr.trim().to_string(),
            });
        }

        let checkout = self
            .git(copy.path())
            .args(["checkout", "--quiet", "--detach"])
            .arg(&event.commit_sha);
        let output = self.runner.run(&checkout).await?;
        if output.timed_out {
            return Err(StagingError::Timeout {
                step: "git checkout",
                secs: self.timeout.as_secs(),
            });
        }
        if !output.success() {
            return Err(StagingError::UnknownRef {
                sha: event.commit_sha.clone(),
                branch: event.branch.clone(),
                stderr: output.stderr.trim().to_string(),
            });
        }

        Ok(copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessError;
    use crate::services::process::ProcessOutput;
    use std::sync::Mutex;

    /// Records every command and answers with a fixed exit code per git subcommand.
    struct FakeGit {
        calls: Mutex<Vec<Vec<String>>>,
        clone_exit: i32,
        checkout_exit: i32,
    }

    #[async_trait]
    impl CommandRunner for FakeGit {
        async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput, ProcessError> {
            self.calls.lock().unwrap().push(spec.args.clone());
            let exit = match spec.args.first().map(String::as_str) {
                Some("clone") => self.clone_exit,
                _ => self.checkout_exit,
            };
            Ok(ProcessOutput {
                exit_code: Some(exit),
                stderr: if exit == 0 { String::new() } else { "fatal: nope".to_string() },
                ..Default::default()
            })
        }
    }

    fn event() -> PushEvent {
        PushEvent {
            repository_url: "https://example.com/octo/hello.git".to_string(),
            repository: Some("octo/hello".to_string()),
            git_ref: "refs/heads/dev".to_string(),
            branch: "dev".to_string(),
            commit_sha: "0123456789abcdef".to_string(),
        }
    }

    fn stager(git: Arc<FakeGit>, root: &Path) -> GitStager {
        GitStager::new(git, root.to_path_buf(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn clones_branch_then_checks_out_commit() {
        let root = tempfile::tempdir().unwrap();
        let git = Arc::new(FakeGit {
            calls: Mutex::new(Vec::new()),
            clone_exit: 0,
            checkout_exit: 0,
        });

        let copy = stager(git.clone(), root.path()).stage(&event()).await.unwrap();
        let name = copy.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("build-0123456-"));

        let calls = git.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0][0], "clone");
        assert!(calls[0].contains(&"dev".to_string()));
        assert_eq!(calls[1], vec!["checkout", "--quiet", "--detach", "0123456789abcdef"]);
    }

    #[tokio::test]
    async fn working_copy_removed_on_failure() {
        let root = tempfile::tempdir().unwrap();
        let git = Arc::new(FakeGit {
            calls: Mutex::new(Vec::new()),
            clone_exit: 0,
            checkout_exit: 128,
        });

        let err = stager(git, root.path()).stage(&event()).await.unwrap_err();
        assert!(matches!(err, StagingError::UnknownRef { .. }));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn clone_failure_is_reported() {
        let root = tempfile::tempdir().unwrap();
        let git = Arc::new(FakeGit {
            calls: Mutex::new(Vec::new()),
            clone_exit: 128,
            checkout_exit: 0,
        });

        let err = stager(git.clone(), root.path()).stage(&event()).await.unwrap_err();
        match err {
            StagingError::Clone { stderr, branch, .. } => {
                assert_eq!(stderr, "fatal: nope");
                assert_eq!(branch, "dev");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(git.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn working_copy_deleted_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let copy = WorkingCopy::create_in(root.path(), "build-x-").unwrap();
        let path = copy.path().to_path_buf();
        std::fs::write(path.join("main.py"), "print(1)\n").unwrap();
        assert!(path.exists());
        drop(copy);
        assert!(!path.exists());
    }
}
