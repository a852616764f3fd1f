// src/engine/synthesis.rs

//! The single downstream step that consumes the joined batch.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::errors::{OrchestratorError, Result};
use crate::exec::{AttemptReport, AttemptStatus, WorkerBackend, WorkerCommand, WorkerInvocation};
use crate::provenance::event::round_secs;
use crate::provenance::{ORCHESTRATOR, ProvenanceEvent, ProvenanceLog, SYNTHESIS};
use crate::scheduler::BatchResult;
use crate::scheduler::task::serialize_secs;

/// File the batch result is handed to the synthesis worker in.
pub const BATCH_RESULT_FILE_NAME: &str = "batch_result.json";

/// Default timeout for the synthesis worker.
pub const DEFAULT_SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisStatus {
    Succeeded,
    Failed,
    TimedOut,
    /// No synthesis worker is configured.
    Skipped,
}

/// How the synthesis step ended. Its failure never changes the batch.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisOutcome {
    pub status: SynthesisStatus,
    pub launched_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(rename = "duration_s", serialize_with = "serialize_secs")]
    pub duration: Duration,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

impl SynthesisOutcome {
    pub fn skipped() -> Self {
        Self {
            status: SynthesisStatus::Skipped,
            launched_at: None,
            finished_at: None,
            duration: Duration::ZERO,
            exit_code: None,
            error: None,
        }
    }

    fn from_report(launched_at: DateTime<Utc>, report: AttemptReport) -> Self {
        let status = match report.status {
            AttemptStatus::Success => SynthesisStatus::Succeeded,
            AttemptStatus::Failure => SynthesisStatus::Failed,
            AttemptStatus::TimedOut => SynthesisStatus::TimedOut,
        };
        let error = match status {
            SynthesisStatus::Succeeded => None,
            _ => report.error.clone().or_else(|| {
                let stderr = report.stderr.trim();
                Some(if stderr.is_empty() {
                    "Unknown error".to_string()
                } else {
                    stderr.to_string()
                })
            }),
        };

        Self {
            status,
            launched_at: Some(launched_at),
            finished_at: Some(report.finished_at),
            duration: report.duration,
            exit_code: report.exit_code,
            error,
        }
    }

    fn spawn_failure(launched_at: DateTime<Utc>, err: &OrchestratorError) -> Self {
        let finished_at = Utc::now();
        Self {
            status: SynthesisStatus::Failed,
            launched_at: Some(launched_at),
            finished_at: Some(finished_at),
            duration: (finished_at - launched_at).to_std().unwrap_or_default(),
            exit_code: None,
            error: Some(err.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SynthesisStatus::Succeeded
    }
}

/// Launches the synthesis worker once for a finished batch.
pub struct SynthesisStep {
    backend: Arc<dyn WorkerBackend>,
    command: WorkerCommand,
    log: ProvenanceLog,
    timeout: Duration,
}

impl SynthesisStep {
    pub fn new(
        backend: Arc<dyn WorkerBackend>,
        command: WorkerCommand,
        log: ProvenanceLog,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            command,
            log,
            timeout,
        }
    }

    /// Hand `batch` (failed tasks included) to the synthesis worker and wait
    /// for it.
    ///
    /// Consumes the step, so it can be launched at most once. A failing or
    /// hanging worker is reported in the outcome; only IO and provenance
    /// failures return `Err`.
    pub async fn run(self, batch: &BatchResult, output_root: &Path) -> Result<SynthesisOutcome> {
        let batch_file = output_root.join(BATCH_RESULT_FILE_NAME);
        let json = serde_json::to_vec_pretty(batch)?;
        tokio::fs::write(&batch_file, json).await.map_err(|e| {
            OrchestratorError::infrastructure(format!("writing {}", batch_file.display()), e)
        })?;

        let failed: Vec<Value> = batch
            .failed_reports()
            .map(|r| Value::from(r.label()))
            .collect();

        let launched_at = Utc::now();
        self.log.record(
            ProvenanceEvent::at(launched_at, ORCHESTRATOR, "launch_synthesis")
                .detail("tasks", batch.launched())
                .detail("failed_tasks", failed)
                .message("Launching synthesis worker"),
        )?;

        let invocation = WorkerInvocation::for_synthesis(&self.command, output_root, &batch_file);
        let outcome = match self.backend.run_attempt(invocation, self.timeout).await {
            Ok(report) => SynthesisOutcome::from_report(launched_at, report),
            Err(err) => SynthesisOutcome::spawn_failure(launched_at, &err),
        };

        let duration_s = round_secs(outcome.duration);
        let event = match outcome.status {
            SynthesisStatus::Succeeded => ProvenanceEvent::new(SYNTHESIS, "complete")
                .message(format!("Synthesis complete in {duration_s:.1}s")),
            SynthesisStatus::TimedOut => ProvenanceEvent::new(SYNTHESIS, "timeout")
                .message(format!("Synthesis timed out after {duration_s:.0}s")),
            SynthesisStatus::Failed | SynthesisStatus::Skipped => {
                let reason = outcome.error.clone().unwrap_or_default();
                ProvenanceEvent::new(SYNTHESIS, "failed")
                    .detail("error", reason.as_str())
                    .message(format!("Synthesis failed: {reason}"))
            }
        };
        self.log.record(event.detail("duration_s", duration_s))?;

        if !outcome.is_success() {
            warn!(
                status = ?outcome.status,
                error = outcome.error.as_deref().unwrap_or(""),
                "synthesis step did not succeed; batch outcomes remain valid"
            );
        }

        Ok(outcome)
    }
}
