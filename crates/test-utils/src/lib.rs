pub mod builders;
pub mod fake_backend;

pub use fake_backend::{Scripted, ScriptedBackend};

use std::path::Path;
use std::sync::Once;

use serde_json::Value;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 10-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(10), f)
        .await
        .expect("Test timed out after 10 seconds")
}

/// Parse a provenance log: one JSON object per line, panicking on any
/// partial or malformed line.
pub fn read_jsonl(path: &Path) -> Vec<Value> {
    let text = std::fs::read_to_string(path).expect("reading jsonl file");
    text.lines()
        .map(|line| {
            serde_json::from_str(line).unwrap_or_else(|e| panic!("bad line {line:?}: {e}"))
        })
        .collect()
}

/// Events about one task, in log order.
pub fn events_for_task<'a>(events: &'a [Value], label: &str) -> Vec<&'a Value> {
    events
        .iter()
        .filter(|e| e["details"]["task"] == label)
        .collect()
}

/// `action` fields of a list of events.
pub fn actions(events: &[&Value]) -> Vec<String> {
    events
        .iter()
        .map(|e| e["action"].as_str().unwrap_or_default().to_string())
        .collect()
}
