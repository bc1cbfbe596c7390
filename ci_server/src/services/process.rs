//! External process adapter — the one seam through which git and the test
//! tool are invoked.
//!
//! Every command runs in its own process group with piped output and a hard
//! timeout. On timeout the whole group is killed so stray grandchildren
//! (a test runner's workers, a git remote helper) do not outlive the build.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::error::ProcessError;

/// Per-stream cap on captured output.
pub const MAX_CAPTURE_BYTES: usize = 64 * 1024;

/// A command to run: program, arguments, working directory, extra
/// environment and a timeout.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Program and arguments joined for log lines.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// What a finished (or killed) command left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was killed by a signal or by the timeout.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion or timeout.
    ///
    /// Returns `Err` only when the process could not be started or waited on;
    /// a non-zero exit or a timeout is reported in the `ProcessOutput`.
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput, ProcessError>;
}

/// Runs commands as real child processes via `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput, ProcessError> {
        let start = Instant::now();

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            command: spec.display(),
            source,
        })?;
        let pid = child.id();
        let stdout = child.stdout.take().map(|pipe| tokio::spawn(read_tail(pipe)));
        let stderr = child.stderr.take().map(|pipe| tokio::spawn(read_tail(pipe)));

        match tokio::time::timeout(spec.timeout, child.wait()).await {
            Ok(Ok(status)) => Ok(ProcessOutput {
                exit_code: status.code(),
                timed_out: false,
                stdout: collect_tail(stdout).await,
                stderr: collect_tail(stderr).await,
                duration_ms: start.elapsed().as_millis() as u64,
            }),
            Ok(Err(source)) => Err(ProcessError::Wait {
                command: spec.display(),
                source,
            }),
            Err(_) => {
                kill_process_group(pid);
                let _ = child.kill().await;
                tracing::warn!(
                    command = %spec.display(),
                    timeout_secs = spec.timeout.as_secs(),
                    "Command timed out, process group killed"
                );
                let mut stderr = collect_tail(stderr).await;
                if !stderr.is_empty() && !stderr.ends_with('\n') {
                    stderr.push('\n');
                }
                stderr.push_str(&format!("timed out after {}s", spec.timeout.as_secs()));
                Ok(ProcessOutput {
                    exit_code: None,
                    timed_out: true,
                    stdout: collect_tail(stdout).await,
                    stderr,
                    duration_ms: start.elapsed().as_millis() as u64,
                })
            }
        }
    }
}

/// How long to keep draining a pipe after the process itself is gone.
/// A detached grandchild can hold the write end open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Fixed-capacity byte buffer that keeps only the most recent bytes pushed.
#[derive(Debug)]
pub struct TailBuffer {
    bytes: VecDeque<u8>,
    capacity: usize,
    dropped: bool,
}

impl TailBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: VecDeque::with_capacity(capacity.min(8 * 1024)),
            capacity,
            dropped: false,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        let chunk = if chunk.len() > self.capacity {
            self.dropped = true;
            &chunk[chunk.len() - self.capacity..]
        } else {
            chunk
        };
        let overflow = (self.bytes.len() + chunk.len()).saturating_sub(self.capacity);
        if overflow > 0 {
            self.dropped = true;
            self.bytes.drain(..overflow);
        }
        self.bytes.extend(chunk);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decoded contents, prefixed with a marker when earlier output was discarded.
    pub fn into_string(self) -> String {
        let bytes = Vec::from(self.bytes);
        let text = String::from_utf8_lossy(&bytes);
        if self.dropped {
            truncate_tail(&format!("{TRUNCATION_MARKER}{text}"))
        } else {
            truncate_tail(&text)
        }
    }
}

/// Read `pipe` to EOF, holding at most `MAX_CAPTURE_BYTES` of it in memory.
async fn read_tail<R: AsyncRead + Unpin>(mut pipe: R) -> TailBuffer {
    let mut tail = TailBuffer::new(MAX_CAPTURE_BYTES);
    let mut chunk = [0u8; 8 * 1024];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => tail.push(&chunk[..n]),
            Err(e) => {
                tracing::debug!("Stopped reading child output: {e}");
                break;
            }
        }
    }
    tail
}

async fn collect_tail(reader: Option<JoinHandle<TailBuffer>>) -> String {
    let Some(mut reader) = reader else {
        return String::new();
    };
    match tokio::time::timeout(DRAIN_GRACE, &mut reader).await {
        Ok(Ok(tail)) => tail.into_string(),
        Ok(Err(e)) => {
            tracing::debug!("Output reader task failed: {e}");
            String::new()
        }
        Err(_) => {
            reader.abort();
            String::new()
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid else { return };
    // SAFETY: killpg takes plain integers and has no memory-safety preconditions.
    // The child was spawned as leader of its own group, so pgid == pid.
    let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        tracing::debug!(pid, "killpg found no live processes in group");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

const TRUNCATION_MARKER: &str = "...truncated...\n";

/// Keep the last `MAX_CAPTURE_BYTES` of a stream, on a char boundary.
pub fn truncate_tail(text: &str) -> String {
    if text.len() <= MAX_CAPTURE_BYTES {
        return text.to_string();
    }
    let mut start = text.len() - MAX_CAPTURE_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("{TRUNCATION_MARKER}{}", &text[start..])
}
