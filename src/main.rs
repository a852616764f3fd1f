// src/main.rs

use fanjoin::{cli, logging, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("fanjoin error: {err:?}");
        std::process::exit(1);
    }
}

/// Exit code 0 whenever the batch joined; individual task failures are part
/// of the run's data, not an orchestrator failure.
async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await?;
    Ok(())
}
