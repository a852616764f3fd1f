// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::{OrchestratorOptions, SynthesisOptions};
use crate::exec::WorkerCommand;
use crate::scheduler::{RetryPolicy, SchedulerOptions, Task};
use crate::types::GenerationMode;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [run]
/// tasks = ["basketball", "soccer", "tennis"]
/// retry_enabled = true
/// mode = "template"
///
/// [mode_parameters]
/// provider = "together"
///
/// [worker]
/// program = "python3"
/// args = ["poetry_agent.py"]
///
/// [synthesis]
/// program = "python3"
/// args = ["analyzer_agent.py"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub run: RunSection,

    /// Free-form parameters forwarded to every worker as `--param k=v`.
    #[serde(default)]
    pub mode_parameters: BTreeMap<String, String>,

    pub worker: WorkerSection,

    /// Optional synthesis worker; omitted means the step is skipped.
    #[serde(default)]
    pub synthesis: Option<SynthesisSection>,
}

/// `[run]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RunSection {
    /// Task labels (e.g. sport names). Normalised to trimmed lowercase.
    #[serde(default)]
    pub tasks: Vec<String>,

    #[serde(default = "default_retry_enabled")]
    pub retry_enabled: bool,

    /// Relaunches allowed after a failed first attempt.
    #[serde(default = "default_retry_bound")]
    pub retry_bound: u32,

    /// Pause before a relaunch, in milliseconds.
    #[serde(default)]
    pub retry_delay_ms: u64,

    #[serde(default)]
    pub mode: GenerationMode,

    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,

    /// Maximum number of concurrently running workers (default: all tasks).
    #[serde(default)]
    pub concurrency: Option<usize>,

    /// Base directory for session directories.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_retry_enabled() -> bool {
    true
}

fn default_retry_bound() -> u32 {
    1
}

fn default_attempt_timeout_secs() -> u64 {
    120
}

fn default_output_dir() -> String {
    "output".to_string()
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            retry_enabled: default_retry_enabled(),
            retry_bound: default_retry_bound(),
            retry_delay_ms: 0,
            mode: GenerationMode::default(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            concurrency: None,
            output_dir: default_output_dir(),
        }
    }
}

/// `[worker]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSection {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl WorkerSection {
    pub fn command(&self) -> WorkerCommand {
        WorkerCommand::new(self.program.clone(), self.args.clone())
    }
}

/// `[synthesis]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisSection {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_attempt_timeout_secs")]
    pub timeout_secs: u64,
}

/// Validated configuration. Obtain one via `ConfigFile::try_from(raw)` or
/// [`crate::config::load_and_validate`].
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub run: RunSection,
    pub mode_parameters: BTreeMap<String, String>,
    pub worker: WorkerSection,
    pub synthesis: Option<SynthesisSection>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        run: RunSection,
        mode_parameters: BTreeMap<String, String>,
        worker: WorkerSection,
        synthesis: Option<SynthesisSection>,
    ) -> Self {
        Self {
            run,
            mode_parameters,
            worker,
            synthesis,
        }
    }

    /// Materialise the task list, one `Task` per label.
    pub fn tasks(&self) -> Vec<Task> {
        self.run
            .tasks
            .iter()
            .map(|label| Task::new(label.clone(), self.run.mode, self.mode_parameters.clone()))
            .collect()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            enabled: self.run.retry_enabled,
            retry_bound: self.run.retry_bound,
            delay: Duration::from_millis(self.run.retry_delay_ms),
        }
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            concurrency: self.run.concurrency,
            attempt_timeout: Duration::from_secs(self.run.attempt_timeout_secs),
            retry: self.retry_policy(),
        }
    }

    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            worker: self.worker.command(),
            synthesis: self.synthesis.as_ref().map(|s| SynthesisOptions {
                command: WorkerCommand::new(s.program.clone(), s.args.clone()),
                timeout: Duration::from_secs(s.timeout_secs),
            }),
            scheduler: self.scheduler_options(),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.run.output_dir)
    }
}
