//! Child process execution with timeout, cancellation, and bounded capture.
//!
//! One [`ProcessExecutor::execute`] call owns exactly one child process and
//! releases it on every exit path. Output streams drain into byte-bounded
//! tail buffers so verbose tool output cannot grow memory without bound.

use crate::plan::PlannedCommand;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

/// Default cap on the retained stderr tail.
pub const DEFAULT_STDERR_TAIL: usize = 8 * 1024;

/// Default grace period between SIGTERM and SIGKILL.
pub const DEFAULT_TERM_GRACE: Duration = Duration::from_secs(5);

/// How one execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

/// Result of executing one planned command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub outcome: Outcome,
    /// Exit code, when the process exited on its own.
    pub exit_code: Option<i32>,
    /// Tail of captured stderr, byte-bounded.
    pub stderr_tail: String,
    /// Wall-clock time spent on this command.
    #[serde(with = "crate::timecode::serde_secs")]
    pub elapsed: Duration,
    /// Artifacts produced. Populated only on [`Outcome::Succeeded`]; output
    /// from a killed or failed process is never trustworthy.
    pub outputs: Vec<PathBuf>,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.outcome == Outcome::Succeeded
    }

    /// A result for a job cancelled before its process ever started.
    pub fn cancelled_before_start() -> Self {
        Self {
            outcome: Outcome::Cancelled,
            exit_code: None,
            stderr_tail: String::new(),
            elapsed: Duration::ZERO,
            outputs: Vec::new(),
        }
    }

    /// Convert a non-succeeded result into the matching typed error.
    pub fn into_error(self) -> Error {
        match self.outcome {
            Outcome::Succeeded => Error::invalid_parameters("result did not fail"),
            Outcome::Failed => Error::ProcessFailed {
                exit_code: self.exit_code,
                stderr_tail: self.stderr_tail,
            },
            Outcome::TimedOut => Error::ProcessTimedOut { after: self.elapsed },
            Outcome::Cancelled => Error::ProcessCancelled,
        }
    }
}

/// Byte-bounded buffer retaining only the most recent data written to it.
#[derive(Debug, Default)]
struct TailBuf {
    cap: usize,
    buf: Vec<u8>,
}

impl TailBuf {
    fn new(cap: usize) -> Self {
        Self {
            cap,
            buf: Vec::new(),
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        if chunk.len() >= self.cap {
            self.buf.clear();
            self.buf.extend_from_slice(&chunk[chunk.len() - self.cap..]);
            return;
        }
        self.buf.extend_from_slice(chunk);
        if self.buf.len() > self.cap {
            let excess = self.buf.len() - self.cap;
            self.buf.drain(..excess);
        }
    }

    fn into_string(self) -> String {
        String::from_utf8_lossy(&self.buf).trim().to_string()
    }
}

/// Runs one external process per call, under a timeout and a cancellation
/// token, capturing a bounded stderr tail.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    program: PathBuf,
    stderr_tail_bytes: usize,
    term_grace: Duration,
}

enum Waited {
    Exited(std::process::ExitStatus),
    TimedOut,
    Cancelled,
}

impl ProcessExecutor {
    /// Create an executor for a resolved executable path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            stderr_tail_bytes: DEFAULT_STDERR_TAIL,
            term_grace: DEFAULT_TERM_GRACE,
        }
    }

    /// Override the stderr tail cap.
    pub fn with_stderr_tail(mut self, bytes: usize) -> Self {
        self.stderr_tail_bytes = bytes.max(1);
        self
    }

    /// Override the terminate-then-kill grace period.
    pub fn with_term_grace(mut self, grace: Duration) -> Self {
        self.term_grace = grace;
        self
    }

    /// Execute one planned command.
    ///
    /// Exactly one of the four outcomes is returned. On timeout or
    /// cancellation the child is sent a termination signal, given a short
    /// grace period, then force-killed; partial output at the declared
    /// artifact path is removed on every non-succeeded outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExecutableNotFound`] if the program cannot be
    /// spawned because it does not exist, or [`Error::Io`] for other spawn
    /// failures. Tool-level failures are reported through the result's
    /// outcome, not as errors.
    pub async fn execute(
        &self,
        planned: &PlannedCommand,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult> {
        if cancel.is_cancelled() {
            return Ok(ExecutionResult::cancelled_before_start());
        }

        tracing::debug!("spawning {} {:?}", self.program.display(), planned.args);

        let started = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&planned.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::executable_not_found(self.program.to_string_lossy())
                } else {
                    Error::Io(e)
                }
            })?;

        // Drain both pipes concurrently so the child can never block on a
        // full pipe while we wait for it.
        let stdout_task = child.stdout.take().map(|s| drain(s, self.stderr_tail_bytes));
        let stderr_task = child.stderr.take().map(|s| drain(s, self.stderr_tail_bytes));

        let waited = tokio::select! {
            biased;
            _ = cancel.cancelled() => Waited::Cancelled,
            status = child.wait() => Waited::Exited(status?),
            _ = tokio::time::sleep(planned.timeout) => Waited::TimedOut,
        };

        if !matches!(waited, Waited::Exited(_)) {
            self.terminate_then_kill(&mut child).await;
        }

        let elapsed = started.elapsed();
        let stderr_tail = match stderr_task {
            Some(task) => task.await.unwrap_or_default().into_string(),
            None => String::new(),
        };
        if let Some(task) = stdout_task {
            // Stdout is drained for back-pressure only; ffmpeg reports on stderr.
            let _ = task.await;
        }

        let result = match waited {
            Waited::Exited(status) if status.success() => {
                let artifact_missing = match &planned.output {
                    Some(path) => !artifact_ok(path).await,
                    None => false,
                };
                if artifact_missing {
                    // Some tools report success without writing anything.
                    tracing::warn!(
                        "process exited 0 but declared artifact is missing or empty: {:?}",
                        planned.output
                    );
                    ExecutionResult {
                        outcome: Outcome::Failed,
                        exit_code: status.code(),
                        stderr_tail,
                        elapsed,
                        outputs: Vec::new(),
                    }
                } else {
                    ExecutionResult {
                        outcome: Outcome::Succeeded,
                        exit_code: status.code(),
                        stderr_tail,
                        elapsed,
                        outputs: planned.output.iter().cloned().collect(),
                    }
                }
            }
            Waited::Exited(status) => {
                tracing::debug!("process failed with {status}: {stderr_tail}");
                ExecutionResult {
                    outcome: Outcome::Failed,
                    exit_code: status.code(),
                    stderr_tail,
                    elapsed,
                    outputs: Vec::new(),
                }
            }
            Waited::TimedOut => {
                tracing::warn!("process timed out after {:?}", planned.timeout);
                ExecutionResult {
                    outcome: Outcome::TimedOut,
                    exit_code: None,
                    stderr_tail,
                    elapsed,
                    outputs: Vec::new(),
                }
            }
            Waited::Cancelled => ExecutionResult {
                outcome: Outcome::Cancelled,
                exit_code: None,
                stderr_tail,
                elapsed,
                outputs: Vec::new(),
            },
        };

        if !result.succeeded() {
            if let Some(path) = &planned.output {
                discard_artifact(path).await;
            }
        }

        Ok(result)
    }

    /// Send SIGTERM, wait up to the grace period, then SIGKILL.
    async fn terminate_then_kill(&self, child: &mut Child) {
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
        #[cfg(not(unix))]
        let _ = child.start_kill();

        if tokio::time::timeout(self.term_grace, child.wait())
            .await
            .is_err()
        {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
}

fn drain<R>(mut reader: R, cap: usize) -> tokio::task::JoinHandle<TailBuf>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut tail = TailBuf::new(cap);
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => tail.push(&chunk[..n]),
            }
        }
        tail
    })
}

/// An artifact counts only if it exists and is non-empty.
async fn artifact_ok(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.len() > 0)
        .unwrap_or(false)
}

async fn discard_artifact(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!("discarded partial artifact {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("failed to remove partial artifact {}: {e}", path.display()),
    }
}
