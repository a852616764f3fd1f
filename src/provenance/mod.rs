// src/provenance/mod.rs

//! Provenance logging: the auditable record of every orchestration step.
//!
//! - [`event`] defines the JSON line format.
//! - [`log`] owns the shared, mutex-guarded append-only file.
//!
//! The log is always passed explicitly as a [`ProvenanceLog`] handle; there is
//! no global logger.

pub mod event;
pub mod log;

pub use event::{ORCHESTRATOR, ProvenanceEvent, SYNTHESIS, worker_actor};
pub use log::ProvenanceLog;

/// File name of the provenance log inside a session's output root.
pub const LOG_FILE_NAME: &str = "execution_log.jsonl";
