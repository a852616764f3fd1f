// tests/workflow_end_to_end.rs

use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fanjoin::engine::{
    Orchestrator, OrchestratorOptions, SynthesisOptions, SynthesisStatus,
};
use fanjoin::exec::{WorkerBackend, WorkerCommand};
use fanjoin::provenance::LOG_FILE_NAME;
use fanjoin::scheduler::{SchedulerOptions, TaskOutcome};
use fanjoin::session::SessionManager;
use fanjoin_test_utils::builders::tasks;
use fanjoin_test_utils::{Scripted, ScriptedBackend, init_tracing, read_jsonl, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

/// Writes a poem and a metadata descriptor, except for `cricket`, which fails.
const WORKER_SCRIPT: &str = r##"
if [ "$1" = cricket ]; then echo "no poems" >&2; exit 4; fi
echo "# $1" > "$2/poem.md"
printf '{"task":"%s","poems":1}' "$1" > "$2/metadata.json"
"##;

/// Keeps a copy of the batch it was handed.
const SYNTHESIS_SCRIPT: &str = r#"cp "$2" "$1/synthesis_input.json""#;

fn options(synthesis: Option<SynthesisOptions>) -> OrchestratorOptions {
    OrchestratorOptions {
        worker: WorkerCommand::shell(WORKER_SCRIPT),
        synthesis,
        scheduler: SchedulerOptions {
            attempt_timeout: Duration::from_secs(10),
            ..SchedulerOptions::default()
        },
    }
}

fn process_orchestrator(base: &Path, synthesis: Option<SynthesisOptions>) -> Orchestrator {
    Orchestrator::new(
        SessionManager::new(base),
        Arc::new(fanjoin::exec::ProcessBackend::new()),
        options(synthesis),
    )
}

fn position(events: &[serde_json::Value], actor: &str, action: &str) -> usize {
    events
        .iter()
        .position(|e| e["actor"] == actor && e["action"] == action)
        .unwrap_or_else(|| panic!("no {actor}/{action} event"))
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn full_run_with_real_workers() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let synthesis = SynthesisOptions::new(WorkerCommand::shell(SYNTHESIS_SCRIPT));
    let orchestrator = process_orchestrator(dir.path(), Some(synthesis));

    let report = with_timeout(orchestrator.run(tasks(&["soccer", "cricket", "golf"]))).await?;
    let root = report.session.output_root();

    assert_eq!(report.batch.launched(), 3);
    assert_eq!(report.batch.succeeded(), 2);
    assert_eq!(report.batch.failed(), 1);
    let cricket = report.batch.report("cricket").unwrap();
    assert_eq!(cricket.outcome, TaskOutcome::Failed);
    assert_eq!(cricket.attempts.len(), 2);
    assert_eq!(cricket.error().as_deref(), Some("no poems"));
    assert_eq!(
        report.batch.report("golf").unwrap().metadata.as_ref().unwrap()["task"],
        "golf"
    );

    // Synthesis only started once every task was terminal.
    assert_eq!(report.synthesis.status, SynthesisStatus::Succeeded);
    let launched_at = report.synthesis.launched_at.unwrap();
    assert!(launched_at > report.batch.last_attempt_finished_at().unwrap());
    assert!(launched_at >= report.batch.completed_at());

    // It saw every outcome, the failed one included.
    let handed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(root.join("synthesis_input.json"))?)?;
    let outcomes: Vec<(&str, &str)> = handed["reports"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| {
            (
                r["task"]["label"].as_str().unwrap(),
                r["outcome"].as_str().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        outcomes,
        [("soccer", "succeeded"), ("cricket", "failed"), ("golf", "succeeded")]
    );

    assert!(root.join("golf").join("poem.md").is_file());
    assert!(root.join("run_summary.json").is_file());
    assert!(root.join("batch_result.json").is_file());

    assert_eq!(report.summary.workers_failed, 1);
    assert_eq!(report.summary.retry_count, 1);
    assert_eq!(report.summary.errors, ["cricket: no poems"]);

    let sessions = orchestrator.sessions();
    assert_eq!(sessions.latest_session_id().as_deref(), Some(report.session.id()));
    assert_eq!(read_jsonl(&dir.path().join("usage_log.jsonl")).len(), 1);

    let events = read_jsonl(&root.join(LOG_FILE_NAME));
    assert_eq!(events.first().unwrap()["action"], "workflow_start");
    assert_eq!(events.last().unwrap()["action"], "workflow_complete");
    let joined = position(&events, "orchestrator", "workers_complete");
    let launch = position(&events, "orchestrator", "launch_synthesis");
    let done = position(&events, "synthesis", "complete");
    assert!(joined < launch && launch < done);
    assert!(
        events[..joined]
            .iter()
            .all(|e| e["actor"] != "synthesis" && e["action"] != "launch_synthesis")
    );
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn failing_synthesis_does_not_fail_the_run() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let synthesis = SynthesisOptions::new(WorkerCommand::shell("echo broken >&2; exit 7"));
    let orchestrator = process_orchestrator(dir.path(), Some(synthesis));

    let report = with_timeout(orchestrator.run(tasks(&["soccer", "golf"]))).await?;

    assert_eq!(report.batch.succeeded(), 2);
    assert_eq!(report.synthesis.status, SynthesisStatus::Failed);
    assert_eq!(report.synthesis.exit_code, Some(7));
    assert_eq!(report.summary.synthesis_status, SynthesisStatus::Failed);
    assert_eq!(report.summary.errors, ["synthesis: broken"]);

    let events = read_jsonl(&report.session.output_root().join(LOG_FILE_NAME));
    let failed = &events[position(&events, "synthesis", "failed")];
    assert_eq!(failed["details"]["error"], "broken");
    assert_eq!(events.last().unwrap()["action"], "workflow_complete");
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn hanging_synthesis_is_timed_out() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let synthesis = SynthesisOptions {
        command: WorkerCommand::shell("sleep 30"),
        timeout: Duration::from_millis(200),
    };
    let orchestrator = process_orchestrator(dir.path(), Some(synthesis));

    let report = with_timeout(orchestrator.run(tasks(&["golf"]))).await?;

    assert_eq!(report.synthesis.status, SynthesisStatus::TimedOut);
    let events = read_jsonl(&report.session.output_root().join(LOG_FILE_NAME));
    position(&events, "synthesis", "timeout");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn synthesis_runs_once_after_every_task_attempt() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let backend = ScriptedBackend::new()
        .always("cricket", Scripted::Fail(1))
        .on_attempt("golf", 1, Scripted::TimeOut)
        .with_delay(Duration::from_millis(20))
        .into_shared();
    let shared: Arc<dyn WorkerBackend> = backend.clone();
    let orchestrator = Orchestrator::new(
        SessionManager::new(dir.path()),
        shared,
        OrchestratorOptions {
            worker: WorkerCommand::new("worker", vec![]),
            synthesis: Some(SynthesisOptions::new(WorkerCommand::new("synth", vec![]))),
            scheduler: SchedulerOptions::default(),
        },
    );

    let report = with_timeout(orchestrator.run(tasks(&["soccer", "cricket", "golf"]))).await?;

    let calls = backend.calls();
    let synthesis_calls: Vec<usize> = calls
        .iter()
        .enumerate()
        .filter(|(_, (label, _))| label == "synthesis")
        .map(|(i, _)| i)
        .collect();
    assert_eq!(synthesis_calls, [calls.len() - 1]);
    assert_eq!(calls.len(), 1 + 1 + 2 + 2);

    let inputs = backend.synthesis_inputs();
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0]["launched"], 3);
    assert_eq!(inputs[0]["failed"], 1);
    assert_eq!(inputs[0]["reports"][1]["outcome"], "failed");
    assert_eq!(inputs[0]["reports"][2]["attempts"][0]["status"], "timed_out");

    assert_eq!(report.synthesis.status, SynthesisStatus::Succeeded);
    assert!(report.synthesis.launched_at.unwrap() > report.batch.last_attempt_finished_at().unwrap());
    Ok(())
}

#[tokio::test]
async fn run_without_synthesis_records_the_skip() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let backend = ScriptedBackend::new().into_shared();
    let shared: Arc<dyn WorkerBackend> = backend.clone();
    let orchestrator = Orchestrator::new(
        SessionManager::new(dir.path()),
        shared,
        OrchestratorOptions {
            worker: WorkerCommand::new("worker", vec![]),
            synthesis: None,
            scheduler: SchedulerOptions::default(),
        },
    );

    let report = with_timeout(orchestrator.run(tasks(&["golf"]))).await?;

    assert_eq!(report.synthesis.status, SynthesisStatus::Skipped);
    assert!(backend.calls().iter().all(|(label, _)| label != "synthesis"));
    let events = read_jsonl(&report.session.output_root().join(LOG_FILE_NAME));
    position(&events, "orchestrator", "synthesis_skipped");
    Ok(())
}

#[tokio::test]
async fn consecutive_runs_get_separate_sessions() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let backend = ScriptedBackend::new().into_shared();
    let shared: Arc<dyn WorkerBackend> = backend.clone();
    let orchestrator = Orchestrator::new(
        SessionManager::new(dir.path()),
        shared,
        OrchestratorOptions {
            worker: WorkerCommand::new("worker", vec![]),
            synthesis: None,
            scheduler: SchedulerOptions::default(),
        },
    );

    let first = with_timeout(orchestrator.run(tasks(&["golf"]))).await?;
    let second = with_timeout(orchestrator.run(tasks(&["golf"]))).await?;

    assert_ne!(first.session.id(), second.session.id());
    assert!(first.session.output_root().join(LOG_FILE_NAME).is_file());
    assert_eq!(
        orchestrator.sessions().latest_session_id().as_deref(),
        Some(second.session.id())
    );

    let usage = read_jsonl(&dir.path().join("usage_log.jsonl"));
    let ids: Vec<_> = usage.iter().map(|u| u["session_id"].as_str().unwrap()).collect();
    assert_eq!(ids, [first.session.id(), second.session.id()]);
    Ok(())
}

#[tokio::test]
async fn run_where_no_worker_can_start_fails_without_synthesis() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let backend = ScriptedBackend::new()
        .always("golf", Scripted::SpawnError)
        .into_shared();
    let shared: Arc<dyn WorkerBackend> = backend.clone();
    let orchestrator = Orchestrator::new(
        SessionManager::new(dir.path()),
        shared,
        OrchestratorOptions {
            worker: WorkerCommand::new("worker", vec![]),
            synthesis: Some(SynthesisOptions::new(WorkerCommand::new("synth", vec![]))),
            scheduler: SchedulerOptions::default(),
        },
    );

    let err = with_timeout(orchestrator.run(tasks(&["golf"]))).await.unwrap_err();

    assert!(err.is_infrastructure());
    assert!(backend.synthesis_inputs().is_empty());
    assert!(backend.calls().iter().all(|(label, _)| label != "synthesis"));
    assert_eq!(orchestrator.sessions().latest_session_id(), None);
    Ok(())
}
