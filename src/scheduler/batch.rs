// src/scheduler/batch.rs

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::scheduler::task::{TaskReport, serialize_secs};

/// The complete, read-only set of task outcomes for one run.
///
/// Only the scheduler can build one, and it does so exactly once, after every
/// task has reached a terminal outcome.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    launched: usize,
    succeeded: usize,
    failed: usize,
    total_attempts: usize,
    retries: usize,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    #[serde(rename = "elapsed_s", serialize_with = "serialize_secs")]
    elapsed: Duration,
    reports: Vec<TaskReport>,
}

impl BatchResult {
    pub(crate) fn new(
        reports: Vec<TaskReport>,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        let succeeded = reports.iter().filter(|r| r.succeeded()).count();
        let total_attempts = reports.iter().map(|r| r.attempts.len()).sum::<usize>();

        Self {
            launched: reports.len(),
            succeeded,
            failed: reports.len() - succeeded,
            total_attempts,
            retries: total_attempts - reports.len(),
            started_at,
            completed_at,
            elapsed,
            reports,
        }
    }

    /// One report per submitted task, in submission order.
    pub fn reports(&self) -> &[TaskReport] {
        &self.reports
    }

    pub fn report(&self, label: &str) -> Option<&TaskReport> {
        self.reports.iter().find(|r| r.label() == label)
    }

    pub fn failed_reports(&self) -> impl Iterator<Item = &TaskReport> {
        self.reports.iter().filter(|r| !r.succeeded())
    }

    pub fn launched(&self) -> usize {
        self.launched
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn total_attempts(&self) -> usize {
        self.total_attempts
    }

    /// Attempts beyond the first one, across all tasks.
    pub fn retries(&self) -> usize {
        self.retries
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When the last task's final attempt had finished and the batch joined.
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Finish time of the last-finishing final attempt in the batch.
    pub fn last_attempt_finished_at(&self) -> Option<DateTime<Utc>> {
        self.reports
            .iter()
            .filter_map(|r| r.last_attempt().map(|a| a.finished_at))
            .max()
    }
}
