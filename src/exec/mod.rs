// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running workers, using
//! `tokio::process::Command`, and reporting how each attempt ended.
//!
//! - [`invocation`] turns a task (or the synthesis step) into a program,
//!   arguments and environment.
//! - [`worker`] owns [`WorkerHandle`]: launch, bounded wait, forced kill and
//!   output capture.
//! - [`backend`] provides the `WorkerBackend` trait and the concrete
//!   `ProcessBackend` used in production, which tests can replace with a
//!   scripted implementation.

pub mod backend;
pub mod invocation;
pub mod worker;

pub use backend::{AttemptFuture, ProcessBackend, WorkerBackend};
pub use invocation::{WorkerCommand, WorkerInvocation};
pub use worker::{AttemptReport, AttemptStatus, WorkerHandle};
