// src/provenance/log.rs

//! Append-only, thread-safe JSONL event recorder.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::errors::{OrchestratorError, Result};
use crate::provenance::event::ProvenanceEvent;

/// Shared handle to the provenance log of one run.
///
/// Cloning is cheap; every clone appends to the same file. Each `record`
/// writes one complete line while holding the mutex, so concurrent writers
/// never interleave partial lines.
#[derive(Clone)]
pub struct ProvenanceLog {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl fmt::Debug for ProvenanceLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvenanceLog")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ProvenanceLog {
    /// Open (or create) the log file in append mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                OrchestratorError::infrastructure(
                    format!("opening provenance log {}", path.display()),
                    e,
                )
            })?;

        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event.
    pub fn record(&self, event: ProvenanceEvent) -> Result<()> {
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');

        {
            let mut file = self.lock()?;
            file.write_all(line.as_bytes()).map_err(|e| {
                OrchestratorError::infrastructure("writing provenance event", e)
            })?;
        }

        match &event.message {
            Some(message) => info!(actor = %event.actor, action = %event.action, "{message}"),
            None => info!(actor = %event.actor, action = %event.action, "provenance event"),
        }

        Ok(())
    }

    /// Persist everything recorded so far.
    pub fn flush(&self) -> Result<()> {
        let mut file = self.lock()?;
        file.flush()
            .and_then(|()| file.sync_data())
            .map_err(|e| OrchestratorError::infrastructure("flushing provenance log", e))
    }

    /// [`flush`](Self::flush) on the blocking pool, for use from async code.
    ///
    /// `sync_data` can stall for a long time on a busy disk; this keeps it
    /// off the runtime's worker threads.
    pub async fn flush_blocking(&self) -> Result<()> {
        let log = self.clone();
        tokio::task::spawn_blocking(move || log.flush())
            .await
            .map_err(|e| OrchestratorError::infrastructure("flushing provenance log", e))?
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, File>> {
        self.file
            .lock()
            .map_err(|_| OrchestratorError::Infrastructure("provenance log mutex poisoned".into()))
    }
}
