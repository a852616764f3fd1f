use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use fanjoin::errors::OrchestratorError;
use fanjoin::exec::{AttemptFuture, AttemptReport, AttemptStatus, WorkerBackend, WorkerInvocation};
use serde_json::Value;

/// What a scripted attempt does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scripted {
    Succeed,
    /// Exit with the given non-zero code.
    Fail(i32),
    /// Report a timeout (without actually waiting for it).
    TimeOut,
    /// The worker cannot be started.
    SpawnError,
}

/// A fake backend that:
/// - records every `(label, attempt)` it was asked to run, in order
/// - answers from a script (default: succeed)
/// - tracks how many attempts were in flight at once
/// - keeps the JSON the synthesis worker would have received
/// - optionally writes a `metadata.json` descriptor for an attempt
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    per_attempt: HashMap<(String, u32), Scripted>,
    per_label: HashMap<String, Scripted>,
    metadata: HashMap<(String, u32), Value>,
    delay: Duration,
    calls: Mutex<Vec<(String, u32)>>,
    synthesis_inputs: Mutex<Vec<Value>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script one specific attempt of one label.
    pub fn on_attempt(mut self, label: &str, attempt: u32, outcome: Scripted) -> Self {
        self.per_attempt.insert((label.to_string(), attempt), outcome);
        self
    }

    /// Script every attempt of one label.
    pub fn always(mut self, label: &str, outcome: Scripted) -> Self {
        self.per_label.insert(label.to_string(), outcome);
        self
    }

    /// Have one attempt write `metadata.json` into its output directory.
    pub fn writes_metadata(mut self, label: &str, attempt: u32, descriptor: Value) -> Self {
        self.metadata.insert((label.to_string(), attempt), descriptor);
        self
    }

    /// Simulated run time of each attempt.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn attempts_for(&self, label: &str) -> usize {
        self.calls().iter().filter(|(l, _)| l == label).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Batch results handed to the synthesis worker, one per launch.
    pub fn synthesis_inputs(&self) -> Vec<Value> {
        self.synthesis_inputs.lock().unwrap().clone()
    }

    fn outcome_for(&self, label: &str, attempt: u32) -> Scripted {
        self.per_attempt
            .get(&(label.to_string(), attempt))
            .or_else(|| self.per_label.get(label))
            .copied()
            .unwrap_or(Scripted::Succeed)
    }
}

impl WorkerBackend for ScriptedBackend {
    fn run_attempt(&self, invocation: WorkerInvocation, timeout: Duration) -> AttemptFuture<'_> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap()
                .push((invocation.label.clone(), invocation.attempt));

            if invocation.label == "synthesis" {
                if let Some(batch_file) = invocation.args.last() {
                    let text = std::fs::read_to_string(PathBuf::from(batch_file))?;
                    let value: Value = serde_json::from_str(&text)?;
                    self.synthesis_inputs.lock().unwrap().push(value);
                }
            }

            let outcome = self.outcome_for(&invocation.label, invocation.attempt);
            if outcome == Scripted::SpawnError {
                return Err(OrchestratorError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("scripted spawn failure for {}", invocation.label),
                )));
            }

            if let Some(descriptor) = self
                .metadata
                .get(&(invocation.label.clone(), invocation.attempt))
            {
                std::fs::write(
                    invocation.output_dir.join("metadata.json"),
                    serde_json::to_vec(descriptor)?,
                )?;
            }

            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            let started_at = Utc::now();
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let (status, exit_code, duration, error, stderr) = match outcome {
                Scripted::Succeed => (AttemptStatus::Success, Some(0), self.delay, None, String::new()),
                Scripted::Fail(code) => (
                    AttemptStatus::Failure,
                    Some(code),
                    self.delay,
                    None,
                    format!("scripted failure {code}"),
                ),
                Scripted::TimeOut => (
                    AttemptStatus::TimedOut,
                    None,
                    timeout,
                    Some(format!("timed out after {}s", timeout.as_secs())),
                    String::new(),
                ),
                Scripted::SpawnError => unreachable!("handled above"),
            };

            Ok::<_, OrchestratorError>(AttemptReport {
                status,
                exit_code,
                stdout: format!("{} attempt {}", invocation.label, invocation.attempt),
                stderr,
                error,
                started_at,
                finished_at: Utc::now(),
                duration,
            })
        })
    }
}
