// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Individual task failures are never errors: they are recorded as data in
//! the batch result. Only configuration problems and infrastructure failures
//! (no session directory, no worker could be spawned, provenance log not
//! writable) surface as `Err`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Infrastructure failure: {0}")]
    Infrastructure(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OrchestratorError {
    /// Wrap an IO error with context as an infrastructure failure.
    pub fn infrastructure(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        OrchestratorError::Infrastructure(format!("{context}: {err}"))
    }

    /// Whether this error is an infrastructure failure (the only class that
    /// aborts a run once it has been configured).
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, OrchestratorError::Infrastructure(_))
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, OrchestratorError>;
