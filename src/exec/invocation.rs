// src/exec/invocation.rs

//! Command-line contract between the coordinator and a worker process.

use std::path::{Path, PathBuf};

use crate::scheduler::Task;

/// Environment variables exported to every task worker.
pub const ENV_TASK: &str = "FANJOIN_TASK";
pub const ENV_ATTEMPT: &str = "FANJOIN_ATTEMPT";
pub const ENV_OUTPUT_DIR: &str = "FANJOIN_OUTPUT_DIR";
pub const ENV_MODE: &str = "FANJOIN_MODE";

/// Program plus fixed leading arguments, as configured for a worker kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Convenience for `sh -c <script>` workers (mostly used by tests and
    /// quick experiments). The script sees the task arguments as `$1`, `$2`...
    pub fn shell(script: impl Into<String>) -> Self {
        Self {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.into(), "worker".to_string()],
        }
    }
}

/// Fully resolved launch description for one attempt.
#[derive(Debug, Clone)]
pub struct WorkerInvocation {
    /// Label used for diagnostics (task label, or `synthesis`).
    pub label: String,
    /// 1-based attempt number.
    pub attempt: u32,
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Directory the worker is expected to write its artifacts into.
    pub output_dir: PathBuf,
}

impl WorkerInvocation {
    /// Invocation for one attempt of a task:
    ///
    /// `program [args...] <label> <output_dir> --mode <mode> [--param k=v]...`
    pub fn for_task(command: &WorkerCommand, task: &Task, attempt: u32, output_dir: &Path) -> Self {
        let mut args = command.args.clone();
        args.push(task.label.clone());
        args.push(output_dir.display().to_string());
        args.push("--mode".to_string());
        args.push(task.mode.as_str().to_string());
        for (key, value) in task.mode_parameters.iter() {
            args.push("--param".to_string());
            args.push(format!("{key}={value}"));
        }

        let env = vec![
            (ENV_TASK.to_string(), task.label.clone()),
            (ENV_ATTEMPT.to_string(), attempt.to_string()),
            (ENV_OUTPUT_DIR.to_string(), output_dir.display().to_string()),
            (ENV_MODE.to_string(), task.mode.as_str().to_string()),
        ];

        Self {
            label: task.label.clone(),
            attempt,
            program: command.program.clone(),
            args,
            env,
            output_dir: output_dir.to_path_buf(),
        }
    }

    /// Invocation for the synthesis worker:
    ///
    /// `program [args...] <output_root> <batch_result.json>`
    pub fn for_synthesis(command: &WorkerCommand, output_root: &Path, batch_file: &Path) -> Self {
        let mut args = command.args.clone();
        args.push(output_root.display().to_string());
        args.push(batch_file.display().to_string());

        Self {
            label: "synthesis".to_string(),
            attempt: 1,
            program: command.program.clone(),
            args,
            env: vec![(ENV_OUTPUT_DIR.to_string(), output_root.display().to_string())],
            output_dir: output_root.to_path_buf(),
        }
    }
}
