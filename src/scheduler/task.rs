// src/scheduler/task.rs

//! Tasks, attempts, and per-task outcomes.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::errors::{OrchestratorError, Result};
use crate::exec::{AttemptReport, AttemptStatus};
use crate::types::GenerationMode;

/// Longest failure reason kept in logs and summaries.
const MAX_REASON_CHARS: usize = 500;

/// Labels double as directory names, so keep them to a safe alphabet.
static LABEL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\p{L}\p{N}][\p{L}\p{N} _.-]*$").expect("label pattern is valid")
});

/// Check that every label is non-empty, a safe directory name and unique.
///
/// Each task owns `<output_root>/<label>/`, so this is what keeps task
/// outputs partitioned and inside the session.
pub fn validate_labels<'a>(labels: impl IntoIterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();

    for label in labels {
        if label.is_empty() {
            return Err(OrchestratorError::ConfigError(
                "task list contains an empty label".to_string(),
            ));
        }
        if !LABEL_PATTERN.is_match(label) {
            return Err(OrchestratorError::ConfigError(format!(
                "task label '{label}' may only contain letters, digits, spaces, '_', '.' and '-'"
            )));
        }
        if !seen.insert(label) {
            return Err(OrchestratorError::ConfigError(format!(
                "task list contains duplicate label '{label}'"
            )));
        }
    }
    Ok(())
}

/// One unit of schedulable work. Immutable once a batch starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub label: String,
    pub mode: GenerationMode,
    pub mode_parameters: BTreeMap<String, String>,
}

impl Task {
    pub fn new(
        label: impl Into<String>,
        mode: GenerationMode,
        mode_parameters: BTreeMap<String, String>,
    ) -> Self {
        Self {
            label: label.into(),
            mode,
            mode_parameters,
        }
    }

    /// Task in template mode with no extra parameters.
    pub fn template(label: impl Into<String>) -> Self {
        Self::new(label, GenerationMode::Template, BTreeMap::new())
    }
}

/// One concrete execution of a task by a worker.
#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    /// 1-based attempt number.
    pub number: u32,
    pub status: AttemptStatus,
    /// `false` if the worker process could not be started at all.
    pub spawned: bool,
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(rename = "duration_s", serialize_with = "serialize_secs")]
    pub duration: Duration,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
}

impl Attempt {
    pub fn from_report(number: u32, report: AttemptReport) -> Self {
        Self {
            number,
            status: report.status,
            spawned: true,
            exit_code: report.exit_code,
            started_at: report.started_at,
            finished_at: report.finished_at,
            duration: report.duration,
            stdout: report.stdout,
            stderr: report.stderr,
            error: report.error,
        }
    }

    /// Attempt whose worker never started.
    pub fn spawn_failure(number: u32, started_at: DateTime<Utc>, error: impl Into<String>) -> Self {
        let finished_at = Utc::now();
        Self {
            number,
            status: AttemptStatus::Failure,
            spawned: false,
            exit_code: None,
            started_at,
            finished_at,
            duration: (finished_at - started_at).to_std().unwrap_or_default(),
            stdout: String::new(),
            stderr: String::new(),
            error: Some(error.into()),
        }
    }

    /// Short diagnostic for a non-successful attempt.
    ///
    /// Prefers an explicit error, then the worker's stderr, then the exit code.
    pub fn failure_reason(&self) -> Option<String> {
        if self.status.is_success() {
            return None;
        }
        if let Some(err) = &self.error {
            return Some(err.clone());
        }
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return Some(stderr.chars().take(MAX_REASON_CHARS).collect());
        }
        Some(match self.exit_code {
            Some(code) => format!("worker exited with code {code}"),
            None => "worker terminated by signal".to_string(),
        })
    }
}

/// Final classification of a task across all its attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskOutcome {
    Succeeded,
    Failed,
}

/// A task together with its attempt history and derived outcome.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task: Task,
    pub outcome: TaskOutcome,
    pub attempts: Vec<Attempt>,
    /// The worker's `metadata.json` descriptor, when it wrote a valid one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl TaskReport {
    /// Derive the outcome from a finished attempt history.
    pub fn from_attempts(task: Task, attempts: Vec<Attempt>, metadata: Option<Value>) -> Self {
        let outcome = if attempts.iter().any(|a| a.status.is_success()) {
            TaskOutcome::Succeeded
        } else {
            TaskOutcome::Failed
        };

        Self {
            task,
            outcome,
            attempts,
            metadata,
        }
    }

    pub fn label(&self) -> &str {
        &self.task.label
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == TaskOutcome::Succeeded
    }

    pub fn last_attempt(&self) -> Option<&Attempt> {
        self.attempts.last()
    }

    /// Sum of all attempt durations.
    pub fn total_duration(&self) -> Duration {
        self.attempts.iter().map(|a| a.duration).sum()
    }

    /// Failure reason of the final attempt, if the task failed.
    pub fn error(&self) -> Option<String> {
        if self.succeeded() {
            return None;
        }
        self.last_attempt().and_then(Attempt::failure_reason)
    }

    /// Whether no attempt managed to start a worker process.
    pub fn never_spawned(&self) -> bool {
        self.attempts.iter().all(|a| !a.spawned)
    }
}

pub(crate) fn serialize_secs<S: Serializer>(
    d: &Duration,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(crate::provenance::event::round_secs(*d))
}
