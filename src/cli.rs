// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `fanjoin`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "fanjoin",
    version,
    about = "Fan tasks out to parallel worker processes, retry failures, then run one synthesis step.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Fanjoin.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Fanjoin.toml")]
    pub config: String,

    /// Base directory for session output (overrides `[run].output_dir`).
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<String>,

    /// Never relaunch failed workers (overrides `[run].retry_enabled`).
    #[arg(long)]
    pub no_retry: bool,

    /// Per-attempt timeout in seconds (overrides `[run].attempt_timeout_secs`).
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Maximum number of concurrently running workers.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub concurrency: Option<u64>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `FANJOIN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the planned run, but don't launch any worker.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_parse() {
        let args = CliArgs::try_parse_from([
            "fanjoin",
            "--config",
            "runs/poems.toml",
            "--no-retry",
            "--timeout",
            "30",
            "--concurrency",
            "2",
        ])
        .unwrap();
        assert_eq!(args.config, "runs/poems.toml");
        assert!(args.no_retry);
        assert_eq!(args.timeout, Some(30));
        assert_eq!(args.concurrency, Some(2));
        assert!(!args.dry_run);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(CliArgs::try_parse_from(["fanjoin", "--timeout", "0"]).is_err());
    }
}
