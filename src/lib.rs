// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod provenance;
pub mod scheduler;
pub mod session;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_from_path;
use crate::config::{ConfigFile, RawConfigFile};
use crate::engine::{Orchestrator, RunReport};
use crate::errors::Result;
use crate::exec::ProcessBackend;
use crate::session::SessionManager;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and CLI overrides
/// - the session manager
/// - the process-backed orchestrator (scheduler + synthesis)
///
/// Returns `None` for `--dry-run`.
pub async fn run(args: CliArgs) -> Result<Option<RunReport>> {
    let cfg = load_config(&args)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(None);
    }

    let sessions = SessionManager::new(cfg.output_dir());
    let orchestrator = Orchestrator::new(
        sessions,
        Arc::new(ProcessBackend::new()),
        cfg.orchestrator_options(),
    );

    let tasks = cfg.tasks();
    info!(tasks = ?cfg.run.tasks, mode = %cfg.run.mode, "starting run");

    let report = orchestrator.run(tasks).await?;

    println!(
        "session {}: {} succeeded, {} failed, synthesis {:?}",
        report.session.id(),
        report.batch.succeeded(),
        report.batch.failed(),
        report.synthesis.status
    );
    for failed in report.batch.failed_reports() {
        warn!(
            task = %failed.label(),
            attempts = failed.attempts.len(),
            error = failed.error().as_deref().unwrap_or(""),
            "task failed"
        );
    }

    Ok(Some(report))
}

/// Load the config file, apply command-line overrides, then validate the
/// combined result.
fn load_config(args: &CliArgs) -> Result<ConfigFile> {
    let mut raw = load_from_path(PathBuf::from(&args.config))?;
    apply_overrides(&mut raw, args);
    ConfigFile::try_from(raw)
}

/// Command-line flags win over the config file.
fn apply_overrides(cfg: &mut RawConfigFile, args: &CliArgs) {
    if let Some(dir) = &args.output_dir {
        cfg.run.output_dir = dir.clone();
    }
    if args.no_retry {
        cfg.run.retry_enabled = false;
    }
    if let Some(secs) = args.timeout {
        cfg.run.attempt_timeout_secs = secs;
    }
    if let Some(n) = args.concurrency {
        cfg.run.concurrency = usize::try_from(n).ok();
    }
}

/// Simple dry-run output: print tasks, worker command and run knobs.
fn print_dry_run(cfg: &ConfigFile) {
    let options = cfg.orchestrator_options();

    println!("fanjoin dry-run");
    println!("  run.mode = {}", cfg.run.mode);
    println!(
        "  run.retry = {} (max attempts per task: {})",
        cfg.run.retry_enabled,
        options.scheduler.retry.max_attempts()
    );
    println!("  run.attempt_timeout_secs = {}", cfg.run.attempt_timeout_secs);
    match cfg.run.concurrency {
        Some(n) => println!("  run.concurrency = {n}"),
        None => println!("  run.concurrency = all tasks"),
    }
    println!("  run.output_dir = {}", cfg.run.output_dir);
    println!();

    println!("worker: {} {:?}", options.worker.program, options.worker.args);
    match &options.synthesis {
        Some(s) => println!("synthesis: {} {:?} (timeout {}s)", s.command.program, s.command.args, s.timeout.as_secs()),
        None => println!("synthesis: (none)"),
    }
    println!();

    println!("tasks ({}):", cfg.run.tasks.len());
    for task in cfg.tasks() {
        println!("  - {}", task.label);
        for (key, value) in task.mode_parameters.iter() {
            println!("      {key} = {value}");
        }
    }

    debug!("dry-run complete (no execution)");
}
