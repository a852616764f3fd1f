// src/exec/backend.rs

//! Pluggable worker backend abstraction.
//!
//! The scheduler and the synthesis step talk to a `WorkerBackend` instead of
//! spawning processes directly. This makes it easy to swap in a scripted fake
//! in tests while keeping the production implementation in [`ProcessBackend`].

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::errors::{OrchestratorError, Result};
use crate::exec::invocation::WorkerInvocation;
use crate::exec::worker::{AttemptReport, WorkerHandle};

/// Boxed future returned by [`WorkerBackend::run_attempt`].
pub type AttemptFuture<'a> = Pin<Box<dyn Future<Output = Result<AttemptReport>> + Send + 'a>>;

/// Trait abstracting how a single attempt is executed.
///
/// Production code uses [`ProcessBackend`]; tests can provide their own
/// implementation that doesn't spawn real processes.
pub trait WorkerBackend: Send + Sync {
    /// Launch one attempt and wait for it for at most `timeout`.
    ///
    /// - `Ok(report)`: the worker ran; the report classifies the outcome.
    /// - `Err(_)`: the worker could not be started at all.
    fn run_attempt(&self, invocation: WorkerInvocation, timeout: Duration) -> AttemptFuture<'_>;
}

/// Real backend: one OS process per attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessBackend;

impl ProcessBackend {
    pub fn new() -> Self {
        Self
    }
}

impl WorkerBackend for ProcessBackend {
    fn run_attempt(&self, invocation: WorkerInvocation, timeout: Duration) -> AttemptFuture<'_> {
        Box::pin(async move {
            let handle = WorkerHandle::launch(&invocation)?;
            Ok::<_, OrchestratorError>(handle.await_result(timeout).await)
        })
    }
}
