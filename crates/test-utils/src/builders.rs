use std::collections::BTreeMap;

use fanjoin::config::{ConfigFile, RawConfigFile, RunSection, SynthesisSection, WorkerSection};
use fanjoin::scheduler::Task;
use fanjoin::types::GenerationMode;

/// Template-mode tasks for the given labels.
pub fn tasks(labels: &[&str]) -> Vec<Task> {
    labels.iter().map(|l| Task::template(*l)).collect()
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                run: RunSection::default(),
                mode_parameters: BTreeMap::new(),
                worker: WorkerSection {
                    program: "true".to_string(),
                    args: vec![],
                },
                synthesis: None,
            },
        }
    }

    pub fn with_task(mut self, label: &str) -> Self {
        self.config.run.tasks.push(label.to_string());
        self
    }

    pub fn with_tasks(mut self, labels: &[&str]) -> Self {
        self.config
            .run
            .tasks
            .extend(labels.iter().map(|l| l.to_string()));
        self
    }

    pub fn with_worker(mut self, program: &str, args: &[&str]) -> Self {
        self.config.worker = WorkerSection {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        };
        self
    }

    pub fn with_synthesis(mut self, program: &str, args: &[&str]) -> Self {
        self.config.synthesis = Some(SynthesisSection {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            timeout_secs: 120,
        });
        self
    }

    pub fn with_mode(mut self, mode: GenerationMode) -> Self {
        self.config.run.mode = mode;
        self
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.config
            .mode_parameters
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn retry(mut self, enabled: bool) -> Self {
        self.config.run.retry_enabled = enabled;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.run.concurrency = Some(n);
        self
    }

    pub fn attempt_timeout_secs(mut self, secs: u64) -> Self {
        self.config.run.attempt_timeout_secs = secs;
        self
    }

    pub fn output_dir(mut self, dir: &str) -> Self {
        self.config.run.output_dir = dir.to_string();
        self
    }

    /// The raw, unvalidated configuration.
    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
