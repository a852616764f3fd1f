// src/scheduler/runner.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::errors::{OrchestratorError, Result};
use crate::exec::{AttemptStatus, WorkerBackend, WorkerCommand, WorkerInvocation};
use crate::provenance::event::round_secs;
use crate::provenance::{ORCHESTRATOR, ProvenanceEvent, ProvenanceLog, worker_actor};
use crate::scheduler::batch::BatchResult;
use crate::scheduler::retry::RetryPolicy;
use crate::scheduler::task::{Attempt, Task, TaskReport, validate_labels};

/// Default per-attempt timeout.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(120);

/// Descriptor a worker writes into its output directory on success.
pub const METADATA_FILE_NAME: &str = "metadata.json";

/// Knobs for one batch.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Maximum number of tasks with a live worker at once.
    /// `None` launches every task at once.
    pub concurrency: Option<usize>,
    pub attempt_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            concurrency: None,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// Fans a batch of tasks out to workers and joins on all of them.
///
/// It is responsible for:
/// - launching one worker per task, bounded by the concurrency limit
/// - enforcing the per-attempt timeout (through the backend)
/// - relaunching failed tasks according to the [`RetryPolicy`]
/// - recording every transition in the provenance log
/// - publishing the [`BatchResult`] once every task is terminal
pub struct TaskScheduler {
    backend: Arc<dyn WorkerBackend>,
    command: WorkerCommand,
    log: ProvenanceLog,
    options: SchedulerOptions,
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("command", &self.command)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Everything one task's coordination future needs, owned so it can be
/// spawned onto the runtime.
struct TaskContext {
    backend: Arc<dyn WorkerBackend>,
    command: WorkerCommand,
    log: ProvenanceLog,
    retry: RetryPolicy,
    timeout: Duration,
    output_dir: PathBuf,
}

impl TaskScheduler {
    pub fn new(
        backend: Arc<dyn WorkerBackend>,
        command: WorkerCommand,
        log: ProvenanceLog,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            backend,
            command,
            log,
            options,
        }
    }

    /// Run the whole batch and wait for every task to become terminal.
    ///
    /// Each task writes into `output_root/<label>/`; labels that are not
    /// unique, safe directory names are rejected before anything launches. Individual task failures
    /// are reported in the result; only infrastructure failures return `Err`.
    pub async fn run(&self, tasks: Vec<Task>, output_root: &Path) -> Result<BatchResult> {
        if tasks.is_empty() {
            return Err(OrchestratorError::ConfigError(
                "cannot schedule an empty task list".to_string(),
            ));
        }
        validate_labels(tasks.iter().map(|t| t.label.as_str()))?;

        let started_at = Utc::now();
        let started = Instant::now();
        let count = tasks.len();
        let permits = self.options.concurrency.unwrap_or(count).max(1);
        let labels: Vec<Value> = tasks.iter().map(|t| Value::from(t.label.as_str())).collect();

        self.log.record(
            ProvenanceEvent::new(ORCHESTRATOR, "launch_all_workers")
                .detail("tasks", labels)
                .detail("count", count)
                .detail("concurrency", permits)
                .message(format!("Launching {count} workers in parallel")),
        )?;

        let semaphore = Arc::new(Semaphore::new(permits));
        let mut set = JoinSet::new();

        for (index, task) in tasks.into_iter().enumerate() {
            let ctx = TaskContext {
                backend: Arc::clone(&self.backend),
                command: self.command.clone(),
                log: self.log.clone(),
                retry: self.options.retry,
                timeout: self.options.attempt_timeout,
                output_dir: output_root.join(&task.label),
            };
            let semaphore = Arc::clone(&semaphore);

            set.spawn(async move {
                // The permit covers the task's retry as well.
                let _permit = semaphore.acquire_owned().await.map_err(|_| {
                    OrchestratorError::Infrastructure("worker pool closed".to_string())
                })?;
                let report = run_task(ctx, task).await?;
                Ok::<_, OrchestratorError>((index, report))
            });
        }

        // Join barrier: collect every task, even if one hit a fatal error, so
        // no coordination future outlives this call.
        let mut slots: Vec<Option<TaskReport>> = (0..count).map(|_| None).collect();
        let mut fatal: Option<OrchestratorError> = None;

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok((index, report))) => slots[index] = Some(report),
                Ok(Err(err)) => {
                    error!(error = %err, "task coordination failed");
                    fatal.get_or_insert(err);
                }
                Err(join_err) => {
                    error!(error = %join_err, "task coordination future aborted");
                    fatal.get_or_insert(OrchestratorError::Infrastructure(format!(
                        "task coordination future aborted: {join_err}"
                    )));
                }
            }
        }

        if let Some(err) = fatal {
            return Err(err);
        }

        let reports = slots
            .into_iter()
            .map(|slot| {
                slot.ok_or_else(|| {
                    OrchestratorError::Infrastructure("task finished without a report".to_string())
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if reports.iter().all(TaskReport::never_spawned) {
            let reason = reports
                .first()
                .and_then(TaskReport::error)
                .unwrap_or_else(|| "unknown error".to_string());
            self.log.record(
                ProvenanceEvent::new(ORCHESTRATOR, "no_worker_spawned")
                    .detail("error", reason.as_str())
                    .message(format!("Could not spawn any worker: {reason}")),
            )?;
            self.log.flush_blocking().await?;
            return Err(OrchestratorError::Infrastructure(format!(
                "could not spawn any worker: {reason}"
            )));
        }

        let batch = BatchResult::new(reports, started_at, Utc::now(), started.elapsed());

        self.log.record(
            ProvenanceEvent::new(ORCHESTRATOR, "workers_complete")
                .detail("total", batch.launched())
                .detail("succeeded", batch.succeeded())
                .detail("failed", batch.failed())
                .detail("retries", batch.retries())
                .detail("duration_s", round_secs(batch.elapsed()))
                .message(format!(
                    "All workers complete: {} succeeded, {} failed",
                    batch.succeeded(),
                    batch.failed()
                )),
        )?;
        self.log.flush_blocking().await?;

        Ok(batch)
    }
}

/// Drive one task through its attempts.
///
/// Attempts are numbered explicitly and the loop is bounded by
/// `RetryPolicy::max_attempts`.
async fn run_task(ctx: TaskContext, task: Task) -> Result<TaskReport> {
    tokio::fs::create_dir_all(&ctx.output_dir).await.map_err(|e| {
        OrchestratorError::infrastructure(
            format!("creating task output directory {}", ctx.output_dir.display()),
            e,
        )
    })?;

    let mut attempts: Vec<Attempt> = Vec::new();
    let mut number: u32 = 1;

    loop {
        clear_metadata(&ctx.output_dir).await?;

        ctx.log.record(
            ProvenanceEvent::new(ORCHESTRATOR, "launch_worker")
                .detail("task", task.label.as_str())
                .detail("attempt", number)
                .message(format!("Launching worker for {} (attempt {number})", task.label)),
        )?;

        let launched_at = Utc::now();
        let invocation = WorkerInvocation::for_task(&ctx.command, &task, number, &ctx.output_dir);
        let attempt = match ctx.backend.run_attempt(invocation, ctx.timeout).await {
            Ok(report) => Attempt::from_report(number, report),
            Err(err) => {
                warn!(task = %task.label, attempt = number, error = %err, "worker could not be spawned");
                Attempt::spawn_failure(number, launched_at, err.to_string())
            }
        };

        record_attempt(&ctx.log, &task, &attempt)?;

        let status = attempt.status;
        attempts.push(attempt);

        if !ctx.retry.should_retry(number, status) {
            break;
        }

        number += 1;
        ctx.log.record(
            ProvenanceEvent::new(ORCHESTRATOR, "retry_worker")
                .detail("task", task.label.as_str())
                .detail("attempt", number)
                .message(format!("Retrying {} worker", task.label)),
        )?;

        if !ctx.retry.delay.is_zero() {
            tokio::time::sleep(ctx.retry.delay).await;
        }
    }

    debug_assert!(attempts.len() as u32 <= ctx.retry.max_attempts());

    let metadata = if attempts.iter().any(|a| a.status.is_success()) {
        read_metadata(&ctx.output_dir, &task.label).await
    } else {
        None
    };

    let report = TaskReport::from_attempts(task, attempts, metadata);
    debug!(
        task = %report.label(),
        outcome = ?report.outcome,
        attempts = report.attempts.len(),
        "task reached terminal outcome"
    );
    Ok(report)
}

/// Record the terminal classification of one attempt.
fn record_attempt(log: &ProvenanceLog, task: &Task, attempt: &Attempt) -> Result<()> {
    let duration_s = round_secs(attempt.duration);
    let actor = worker_actor(&task.label);

    let event = match attempt.status {
        AttemptStatus::Success => ProvenanceEvent::new(actor, "complete")
            .message(format!("Completed in {duration_s:.1}s")),
        AttemptStatus::TimedOut => ProvenanceEvent::new(actor, "timeout")
            .message(format!("Worker timed out after {duration_s:.0}s")),
        AttemptStatus::Failure => {
            let reason = attempt
                .failure_reason()
                .unwrap_or_else(|| "Unknown error".to_string());
            let action = if attempt.spawned { "failed" } else { "spawn_error" };
            let mut event = ProvenanceEvent::new(actor, action)
                .detail("error", reason.as_str())
                .message(format!("Failed: {reason}"));
            if let Some(code) = attempt.exit_code {
                event = event.detail("return_code", code);
            }
            event
        }
    };

    log.record(
        event
            .detail("task", task.label.as_str())
            .detail("attempt", attempt.number)
            .detail("duration_s", duration_s),
    )
}

/// Remove a descriptor left behind by an earlier attempt.
async fn clear_metadata(output_dir: &Path) -> Result<()> {
    let path = output_dir.join(METADATA_FILE_NAME);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(OrchestratorError::infrastructure(
            format!("removing stale {}", path.display()),
            e,
        )),
    }
}

/// Read the worker's metadata descriptor, tolerating absence or bad JSON.
async fn read_metadata(output_dir: &Path, label: &str) -> Option<Value> {
    let path = output_dir.join(METADATA_FILE_NAME);
    let contents = match tokio::fs::read_to_string(&path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(task = %label, "worker wrote no metadata descriptor");
            return None;
        }
        Err(e) => {
            warn!(task = %label, path = %path.display(), error = %e, "reading worker metadata failed");
            return None;
        }
    };

    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(task = %label, path = %path.display(), error = %e, "worker metadata is not valid JSON");
            None
        }
    }
}
