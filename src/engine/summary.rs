// src/engine/summary.rs

//! Aggregate per-run summary (one JSON object per run).

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::Value;

use crate::engine::synthesis::{SynthesisOutcome, SynthesisStatus};
use crate::errors::{OrchestratorError, Result};
use crate::provenance::event::round_secs;
use crate::scheduler::{BatchResult, TaskOutcome};
use crate::session::Session;
use crate::types::GenerationMode;

/// Summary file written into the session's output root.
pub const SUMMARY_FILE_NAME: &str = "run_summary.json";

/// Cross-run log in the base output directory, one summary per line.
pub const USAGE_LOG_FILE_NAME: &str = "usage_log.jsonl";

#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub task: String,
    pub status: TaskOutcome,
    pub attempts: usize,
    pub duration_s: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub session_id: String,
    pub timestamp: String,
    pub tasks: Vec<String>,
    pub tasks_count: usize,
    pub mode: Option<GenerationMode>,
    pub workers_launched: usize,
    pub workers_succeeded: usize,
    pub workers_failed: usize,
    pub retry_count: usize,
    pub task_results: Vec<TaskSummary>,
    pub synthesis_status: SynthesisStatus,
    pub synthesis_duration_s: f64,
    pub total_duration_s: f64,
    pub errors: Vec<String>,
}

impl RunSummary {
    pub fn build(
        session: &Session,
        batch: &BatchResult,
        synthesis: &SynthesisOutcome,
        total: Duration,
    ) -> Self {
        let task_results: Vec<TaskSummary> = batch
            .reports()
            .iter()
            .map(|r| TaskSummary {
                task: r.label().to_string(),
                status: r.outcome,
                attempts: r.attempts.len(),
                duration_s: round_secs(r.total_duration()),
                error: r.error(),
                metadata: r.metadata.clone(),
            })
            .collect();

        let mut errors: Vec<String> = task_results
            .iter()
            .filter_map(|t| t.error.as_ref().map(|e| format!("{}: {e}", t.task)))
            .collect();
        if let Some(err) = &synthesis.error {
            errors.push(format!("synthesis: {err}"));
        }

        Self {
            session_id: session.id().to_string(),
            timestamp: session
                .created_at()
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            tasks: task_results.iter().map(|t| t.task.clone()).collect(),
            tasks_count: task_results.len(),
            mode: batch.reports().first().map(|r| r.task.mode),
            workers_launched: batch.launched(),
            workers_succeeded: batch.succeeded(),
            workers_failed: batch.failed(),
            retry_count: batch.retries(),
            task_results,
            synthesis_status: synthesis.status,
            synthesis_duration_s: round_secs(synthesis.duration),
            total_duration_s: round_secs(total),
            errors,
        }
    }

    /// Write the pretty-printed summary into `output_root`.
    pub fn write(&self, output_root: &Path) -> Result<PathBuf> {
        let path = output_root.join(SUMMARY_FILE_NAME);
        let json = serde_json::to_vec_pretty(self)?;
        fs::write(&path, json).map_err(|e| {
            OrchestratorError::infrastructure(format!("writing {}", path.display()), e)
        })?;
        Ok(path)
    }

    /// Append the summary as one line to the cross-run usage log.
    pub fn append_usage_log(&self, base_dir: &Path) -> Result<PathBuf> {
        let path = base_dir.join(USAGE_LOG_FILE_NAME);
        let mut line = serde_json::to_string(self)?;
        line.push('\n');

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut f| f.write_all(line.as_bytes()))
            .map_err(|e| {
                OrchestratorError::infrastructure(format!("appending to {}", path.display()), e)
            })?;
        Ok(path)
    }
}
