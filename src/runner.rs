//! External process execution.
//!
//! Every privileged operation ultimately runs an opaque command string
//! (registry query, WSL lifecycle, browser launch) through this module.
//! All subprocess failure modes — non-zero exit, timeout, spawn failure —
//! are normalized into [`CommandResult`] values; nothing unwinds past this
//! boundary into the dispatcher.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, error, warn};

/// Why an invocation failed. Timeout is deliberately distinct from a
/// non-zero exit so callers can word their messages accordingly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NonZeroExit,
    Timeout,
    Spawn,
}

/// Normalized outcome of one external-process invocation.
///
/// Internal only: handlers map this into response fields, it is never
/// serialized to the extension directly.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub stdout: String,
    pub exit_code: i32,
    pub succeeded: bool,
    pub error_detail: Option<String>,
    pub failure: Option<FailureKind>,
}

impl CommandResult {
    pub fn ok(stdout: String) -> Self {
        Self {
            stdout,
            exit_code: 0,
            succeeded: true,
            error_detail: None,
            failure: None,
        }
    }

    pub fn failed(kind: FailureKind, exit_code: i32, detail: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            exit_code,
            succeeded: false,
            error_detail: Some(detail.into()),
            failure: Some(kind),
        }
    }

    pub const fn timed_out(&self) -> bool {
        matches!(self.failure, Some(FailureKind::Timeout))
    }

    /// Human-readable failure text, in the wording the extension has
    /// historically seen.
    pub fn error_message(&self) -> String {
        match self.failure {
            Some(FailureKind::Timeout) => "Error: Command timed out".to_string(),
            _ => {
                let detail = self.error_detail.as_deref().unwrap_or("");
                format!(
                    "Error: Command failed with exit code {}: {}",
                    self.exit_code, detail
                )
            }
        }
    }
}

/// Seam for executing opaque command strings.
///
/// Handlers depend on this trait rather than on `tokio::process` so tests
/// can substitute a fake backend and count invocations.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a shell-interpreted command, bounded by `timeout`. The child is
    /// killed on expiry. Never returns an error — all failures are values.
    async fn run(&self, command: &str, timeout: Duration) -> CommandResult;

    /// Launch a command without waiting for it to finish (sandbox launch).
    /// Reports spawn failures only.
    async fn spawn_detached(&self, command: &str) -> CommandResult;
}

/// Production runner: shell-interprets the command via `cmd /C` on Windows
/// and `sh -c` elsewhere.
#[derive(Debug, Default, Clone)]
pub struct ShellRunner;

impl ShellRunner {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn shell_command(command: &str) -> Command {
        #[cfg(windows)]
        {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(command);
            cmd
        }
        #[cfg(not(windows))]
        {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command);
            cmd
        }
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str, timeout: Duration) -> CommandResult {
        debug!(command = %command, timeout_secs = timeout.as_secs(), "running command");

        let mut cmd = Self::shell_command(command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(command = %command, error = %e, "failed to spawn command");
                return CommandResult::failed(FailureKind::Spawn, -1, e.to_string());
            }
        };

        // Take the pipes out so `child` stays available for kill-on-timeout.
        // The timed future only borrows the pipes, never the child itself.
        let mut child_stdout = child.stdout.take();
        let mut child_stderr = child.stderr.take();

        let read_all = async {
            let mut stdout_buf = Vec::new();
            let mut stderr_buf = Vec::new();
            if let Some(out) = child_stdout.as_mut() {
                let _ = out.read_to_end(&mut stdout_buf).await;
            }
            if let Some(err) = child_stderr.as_mut() {
                let _ = err.read_to_end(&mut stderr_buf).await;
            }
            (stdout_buf, stderr_buf)
        };

        // One deadline bounds both the pipe reads and the exit wait: a child
        // that closes its pipes but keeps running must still be killed on time.
        let deadline = tokio::time::Instant::now() + timeout;

        let (stdout_buf, stderr_buf) =
            match tokio::time::timeout_at(deadline, read_all).await {
                Ok(bufs) => bufs,
                Err(_) => {
                    error!(command = %command, "command timed out, killing");
                    let _ = child.kill().await;
                    let _ = child.wait().await;
                    return CommandResult::failed(
                        FailureKind::Timeout,
                        -1,
                        format!("timed out after {}s", timeout.as_secs()),
                    );
                }
            };

        let status = match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                error!(command = %command, error = %e, "failed to wait for command");
                return CommandResult::failed(FailureKind::Spawn, -1, e.to_string());
            }
            Err(_) => {
                error!(command = %command, "command timed out after closing its pipes, killing");
                let _ = child.kill().await;
                let _ = child.wait().await;
                return CommandResult::failed(
                    FailureKind::Timeout,
                    -1,
                    format!("timed out after {}s", timeout.as_secs()),
                );
            }
        };

        let stdout = String::from_utf8_lossy(&stdout_buf).trim().to_string();
        let stderr = String::from_utf8_lossy(&stderr_buf).trim().to_string();
        let exit_code = status.code().unwrap_or(-1);

        if status.success() {
            debug!(command = %command, result = %truncate(&stdout, 200), "command succeeded");
            CommandResult::ok(stdout)
        } else {
            warn!(command = %command, exit_code, stderr = %truncate(&stderr, 200), "command failed");
            CommandResult {
                stdout,
                exit_code,
                succeeded: false,
                error_detail: Some(stderr),
                failure: Some(FailureKind::NonZeroExit),
            }
        }
    }

    async fn spawn_detached(&self, command: &str) -> CommandResult {
        debug!(command = %command, "launching detached command");

        let mut cmd = Self::shell_command(command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        match cmd.spawn() {
            Ok(_child) => CommandResult::ok(String::new()),
            Err(e) => {
                error!(command = %command, error = %e, "failed to launch command");
                CommandResult::failed(FailureKind::Spawn, -1, e.to_string())
            }
        }
    }
}

/// Re-invoke a fallible operation up to `max_attempts` times with a fixed
/// delay between attempts. A failed [`CommandResult`] is retryable; the
/// exhausted final failure is annotated with the attempt count.
///
/// The delay blocks the (single-request) message loop by design — see the
/// concurrency notes in `server`.
pub async fn run_with_retry<F, Fut>(op: F, max_attempts: u32, delay: Duration) -> CommandResult
where
    F: Fn(u32) -> Fut,
    Fut: std::future::Future<Output = CommandResult>,
{
    let mut last = CommandResult::failed(FailureKind::Spawn, -1, "no attempts made");
    for attempt in 1..=max_attempts {
        let result = op(attempt).await;
        if result.succeeded {
            return result;
        }
        warn!(
            attempt,
            max_attempts,
            detail = %result.error_detail.as_deref().unwrap_or(""),
            "command attempt failed"
        );
        last = result;
        if attempt < max_attempts {
            tokio::time::sleep(delay).await;
        }
    }
    last.error_detail = Some(format!("Command failed after {max_attempts} attempts"));
    last
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
