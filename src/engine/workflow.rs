// src/engine/workflow.rs

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::engine::summary::RunSummary;
use crate::engine::synthesis::{DEFAULT_SYNTHESIS_TIMEOUT, SynthesisOutcome, SynthesisStep};
use crate::errors::{OrchestratorError, Result};
use crate::exec::{WorkerBackend, WorkerCommand};
use crate::provenance::event::round_secs;
use crate::provenance::{LOG_FILE_NAME, ORCHESTRATOR, ProvenanceEvent, ProvenanceLog};
use crate::scheduler::{BatchResult, SchedulerOptions, Task, TaskScheduler};
use crate::session::{Session, SessionManager};

/// Synthesis worker configuration.
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    pub command: WorkerCommand,
    pub timeout: Duration,
}

impl SynthesisOptions {
    pub fn new(command: WorkerCommand) -> Self {
        Self {
            command,
            timeout: DEFAULT_SYNTHESIS_TIMEOUT,
        }
    }
}

/// Everything needed to run one orchestration.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Worker launched once per task attempt.
    pub worker: WorkerCommand,
    /// Synthesis worker; `None` skips the step.
    pub synthesis: Option<SynthesisOptions>,
    pub scheduler: SchedulerOptions,
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunReport {
    pub session: Session,
    pub batch: BatchResult,
    pub synthesis: SynthesisOutcome,
    pub summary: RunSummary,
}

/// Session -> fan-out/join -> synthesis -> summary -> `latest`.
pub struct Orchestrator {
    sessions: SessionManager,
    backend: Arc<dyn WorkerBackend>,
    options: OrchestratorOptions,
}

impl Orchestrator {
    pub fn new(
        sessions: SessionManager,
        backend: Arc<dyn WorkerBackend>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            sessions,
            backend,
            options,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Execute one complete run.
    ///
    /// Returns `Ok` whenever the batch joined, however many tasks failed.
    /// `Err` means no auditable outcome exists (configuration or
    /// infrastructure failure); in that case no worker was launched if the
    /// session could not be created.
    pub async fn run(&self, tasks: Vec<Task>) -> Result<RunReport> {
        let started = Instant::now();

        if tasks.is_empty() {
            return Err(OrchestratorError::ConfigError(
                "no tasks to run".to_string(),
            ));
        }

        let session = self.sessions.create_session()?;
        let log = ProvenanceLog::open(session.output_root().join(LOG_FILE_NAME))?;

        log.record(
            ProvenanceEvent::new(ORCHESTRATOR, "workflow_start")
                .detail("session_id", session.id())
                .detail("tasks_count", tasks.len())
                .message("Starting workflow"),
        )?;

        match self.run_in_session(&session, &log, tasks, started).await {
            Ok(report) => Ok(report),
            Err(err) => {
                error!(session = %session.id(), error = %err, "workflow failed");
                // Best effort: the log itself may be what failed.
                let _ = log.record(
                    ProvenanceEvent::new(ORCHESTRATOR, "workflow_failed")
                        .detail("error", err.to_string())
                        .message(format!("Workflow failed: {err}")),
                );
                let _ = log.flush_blocking().await;
                Err(err)
            }
        }
    }

    async fn run_in_session(
        &self,
        session: &Session,
        log: &ProvenanceLog,
        tasks: Vec<Task>,
        started: Instant,
    ) -> Result<RunReport> {
        log.record(
            ProvenanceEvent::new(ORCHESTRATOR, "session_dir_created")
                .detail("session_id", session.id())
                .detail("path", session.output_root().display().to_string())
                .message(format!(
                    "Created session directory: {}",
                    session.output_root().display()
                )),
        )?;

        let scheduler = TaskScheduler::new(
            Arc::clone(&self.backend),
            self.options.worker.clone(),
            log.clone(),
            self.options.scheduler.clone(),
        );
        let batch = scheduler.run(tasks, session.output_root()).await?;

        let synthesis = match &self.options.synthesis {
            Some(opts) => {
                let step = SynthesisStep::new(
                    Arc::clone(&self.backend),
                    opts.command.clone(),
                    log.clone(),
                    opts.timeout,
                );
                step.run(&batch, session.output_root()).await?
            }
            None => {
                log.record(
                    ProvenanceEvent::new(ORCHESTRATOR, "synthesis_skipped")
                        .message("No synthesis worker configured"),
                )?;
                SynthesisOutcome::skipped()
            }
        };

        let summary = RunSummary::build(session, &batch, &synthesis, started.elapsed());
        summary.write(session.output_root())?;
        summary.append_usage_log(self.sessions.base_dir())?;
        log.record(
            ProvenanceEvent::new(ORCHESTRATOR, "usage_log_written")
                .detail("total_duration_s", summary.total_duration_s)
                .message(format!(
                    "Usage log written. Total workflow time: {:.1}s",
                    summary.total_duration_s
                )),
        )?;

        self.sessions.mark_latest(session)?;

        log.record(
            ProvenanceEvent::new(ORCHESTRATOR, "workflow_complete")
                .detail("succeeded", batch.succeeded())
                .detail("failed", batch.failed())
                .detail("duration_s", round_secs(started.elapsed()))
                .message("Workflow completed"),
        )?;
        log.flush_blocking().await?;

        info!(
            session = %session.id(),
            succeeded = batch.succeeded(),
            failed = batch.failed(),
            synthesis = ?synthesis.status,
            "run finished"
        );

        Ok(RunReport {
            session: session.clone(),
            batch,
            synthesis,
            summary,
        })
    }
}
