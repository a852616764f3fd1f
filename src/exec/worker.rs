// src/exec/worker.rs

//! One spawned worker process: launch, bounded wait, forced termination.

use std::process::Stdio;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::exec::invocation::WorkerInvocation;

/// Maximum number of bytes kept per captured stream. The rest is still read
/// (so the worker never blocks on a full pipe) but discarded.
pub const MAX_CAPTURED_BYTES: usize = 64 * 1024;

/// How long to wait for stdout/stderr to reach EOF once the process is gone.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Terminal classification of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Exited with code 0.
    Success,
    /// Exited non-zero, was killed by a signal, or could not be started.
    Failure,
    /// Exceeded its timeout and was forcibly terminated.
    TimedOut,
}

impl AttemptStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptStatus::Success)
    }
}

/// What `await_result` observed about a finished worker.
#[derive(Debug, Clone)]
pub struct AttemptReport {
    pub status: AttemptStatus,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Set when waiting on the process itself failed.
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
}

/// The coordinator's view of one running external worker.
///
/// On unix the worker is placed in its own process group so that a timeout
/// kills anything it forked as well.
#[derive(Debug)]
pub struct WorkerHandle {
    label: String,
    attempt: u32,
    child: Child,
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    started: Instant,
    stdout: Option<JoinHandle<String>>,
    stderr: Option<JoinHandle<String>>,
}

impl WorkerHandle {
    /// Spawn the worker described by `invocation`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn launch(invocation: &WorkerInvocation) -> std::io::Result<Self> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let started_at = Utc::now();
        let started = Instant::now();
        let mut child = cmd.spawn()?;
        let pid = child.id();

        info!(
            worker = %invocation.label,
            attempt = invocation.attempt,
            pid,
            program = %invocation.program,
            "worker process started"
        );

        let stdout = child.stdout.take().map(|s| tokio::spawn(capture_stream(s)));
        let stderr = child.stderr.take().map(|s| tokio::spawn(capture_stream(s)));

        Ok(Self {
            label: invocation.label.clone(),
            attempt: invocation.attempt,
            child,
            pid,
            started_at,
            started,
            stdout,
            stderr,
        })
    }

    /// OS process id, if the process has not been reaped yet.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Wait for the worker to exit, for at most `timeout`.
    ///
    /// On expiry the worker (and its process group) is killed and reaped
    /// before this returns, and the report says `TimedOut`.
    pub async fn await_result(mut self, timeout: Duration) -> AttemptReport {
        let waited = tokio::time::timeout(timeout, self.child.wait()).await;

        let (status, exit_code, error) = match waited {
            Ok(Ok(exit)) => {
                let code = exit.code();
                let status = if exit.success() {
                    AttemptStatus::Success
                } else {
                    AttemptStatus::Failure
                };
                (status, code, None)
            }
            Ok(Err(e)) => {
                warn!(worker = %self.label, attempt = self.attempt, error = %e, "waiting on worker failed");
                self.terminate().await;
                (AttemptStatus::Failure, None, Some(format!("waiting on worker: {e}")))
            }
            Err(_) => {
                info!(
                    worker = %self.label,
                    attempt = self.attempt,
                    timeout_s = timeout.as_secs_f64(),
                    "worker exceeded its timeout; terminating"
                );
                self.terminate().await;
                (
                    AttemptStatus::TimedOut,
                    None,
                    Some(format!("timed out after {:.0}s", timeout.as_secs_f64())),
                )
            }
        };

        let duration = self.started.elapsed();
        let finished_at = Utc::now();

        let stdout = collect_capture(self.stdout.take()).await;
        let stderr = collect_capture(self.stderr.take()).await;

        debug!(
            worker = %self.label,
            attempt = self.attempt,
            ?status,
            exit_code,
            duration_ms = duration.as_millis() as u64,
            "worker finished"
        );

        AttemptReport {
            status,
            exit_code,
            stdout,
            stderr,
            error,
            started_at: self.started_at,
            finished_at,
            duration,
        }
    }

    /// Kill the worker and everything in its process group, then reap it.
    async fn terminate(&mut self) {
        #[cfg(unix)]
        {
            if let Some(pid) = self.pid {
                kill_process_group(pid);
            }
        }

        if let Err(e) = self.child.kill().await {
            debug!(
                worker = %self.label,
                attempt = self.attempt,
                error = %e,
                "kill after process-group signal reported an error"
            );
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: killpg only sends a signal; the group id is the worker's own pid
    // because it was spawned with `process_group(0)`.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(pid, error = %std::io::Error::last_os_error(), "killpg failed");
    }
}

async fn capture_stream<R>(mut reader: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut kept = Vec::new();
    let mut chunk = [0u8; 8192];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let room = MAX_CAPTURED_BYTES.saturating_sub(kept.len());
                kept.extend_from_slice(&chunk[..n.min(room)]);
            }
            Err(e) => {
                debug!(error = %e, "reading worker output failed");
                break;
            }
        }
    }

    String::from_utf8_lossy(&kept).into_owned()
}

async fn collect_capture(handle: Option<JoinHandle<String>>) -> String {
    let Some(mut handle) = handle else {
        return String::new();
    };

    match tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut handle).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            debug!(error = %e, "output capture task failed");
            String::new()
        }
        Err(_) => {
            // Something outside the process group still holds the pipe.
            handle.abort();
            String::new()
        }
    }
}
