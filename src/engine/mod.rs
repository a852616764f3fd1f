// src/engine/mod.rs

//! Orchestration engine.
//!
//! This module ties together:
//! - the session (isolated output root)
//! - the batch scheduler (fan-out, retries, join)
//! - the synthesis step (runs once, after the join)
//! - the aggregate run summary
//!
//! The end-to-end sequence lives in [`workflow`]; [`synthesis`] and
//! [`summary`] are its post-join stages.

pub mod summary;
pub mod synthesis;
pub mod workflow;

pub use summary::{RunSummary, TaskSummary};
pub use synthesis::{SynthesisOutcome, SynthesisStatus, SynthesisStep};
pub use workflow::{Orchestrator, OrchestratorOptions, RunReport, SynthesisOptions};
