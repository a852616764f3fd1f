// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{OrchestratorError, Result};
use crate::scheduler::task;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::OrchestratorError;

    fn try_from(mut raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        normalize_labels(&mut raw);
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(
            raw.run,
            raw.mode_parameters,
            raw.worker,
            raw.synthesis,
        ))
    }
}

/// Trim and lowercase task labels.
fn normalize_labels(cfg: &mut RawConfigFile) {
    for label in cfg.run.tasks.iter_mut() {
        *label = label.trim().to_lowercase();
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_labels(cfg)?;
    validate_run_section(cfg)?;
    validate_mode_parameters(cfg)?;
    validate_commands(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.run.tasks.is_empty() {
        return Err(OrchestratorError::ConfigError(
            "[run].tasks must contain at least one task".to_string(),
        ));
    }
    Ok(())
}

fn validate_labels(cfg: &RawConfigFile) -> Result<()> {
    task::validate_labels(cfg.run.tasks.iter().map(String::as_str))
}

fn validate_run_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.run.attempt_timeout_secs == 0 {
        return Err(OrchestratorError::ConfigError(
            "[run].attempt_timeout_secs must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.run.concurrency == Some(0) {
        return Err(OrchestratorError::ConfigError(
            "[run].concurrency must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.run.output_dir.trim().is_empty() {
        return Err(OrchestratorError::ConfigError(
            "[run].output_dir must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_mode_parameters(cfg: &RawConfigFile) -> Result<()> {
    for key in cfg.run.mode.required_parameters() {
        let present = cfg
            .mode_parameters
            .get(*key)
            .is_some_and(|v| !v.trim().is_empty());
        if !present {
            return Err(OrchestratorError::ConfigError(format!(
                "mode '{}' requires [mode_parameters].{key}",
                cfg.run.mode
            )));
        }
    }
    Ok(())
}

fn validate_commands(cfg: &RawConfigFile) -> Result<()> {
    if cfg.worker.program.trim().is_empty() {
        return Err(OrchestratorError::ConfigError(
            "[worker].program must not be empty".to_string(),
        ));
    }
    if let Some(synthesis) = &cfg.synthesis {
        if synthesis.program.trim().is_empty() {
            return Err(OrchestratorError::ConfigError(
                "[synthesis].program must not be empty".to_string(),
            ));
        }
        if synthesis.timeout_secs == 0 {
            return Err(OrchestratorError::ConfigError(
                "[synthesis].timeout_secs must be >= 1 (got 0)".to_string(),
            ));
        }
    }
    Ok(())
}
