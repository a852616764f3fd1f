// src/scheduler/mod.rs

//! Batch scheduling: the fan-out / join core.
//!
//! - [`task`] holds tasks, attempts and per-task outcomes.
//! - [`retry`] contains the pure retry decision.
//! - [`batch`] defines the immutable aggregate published after the join.
//! - [`runner`] contains [`TaskScheduler`], which launches workers,
//!   applies the retry policy and joins on the whole batch.

pub mod batch;
pub mod retry;
pub mod runner;
pub mod task;

pub use batch::BatchResult;
pub use retry::RetryPolicy;
pub use runner::{DEFAULT_ATTEMPT_TIMEOUT, METADATA_FILE_NAME, SchedulerOptions, TaskScheduler};
pub use task::{Attempt, Task, TaskOutcome, TaskReport, validate_labels};
