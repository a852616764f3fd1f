// tests/scheduler_scenarios.rs

use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fanjoin::errors::OrchestratorError;
use fanjoin::exec::{AttemptStatus, WorkerBackend, WorkerCommand};
use fanjoin::provenance::{LOG_FILE_NAME, ProvenanceLog};
use fanjoin::scheduler::{RetryPolicy, SchedulerOptions, TaskOutcome, TaskScheduler};
use fanjoin_test_utils::builders::tasks;
use fanjoin_test_utils::{Scripted, ScriptedBackend};
use fanjoin_test_utils::{actions, events_for_task, init_tracing, read_jsonl, with_timeout};
use serde_json::json;

type TestResult = Result<(), Box<dyn Error>>;

fn scheduler(backend: &Arc<ScriptedBackend>, dir: &Path, options: SchedulerOptions) -> TaskScheduler {
    let log = ProvenanceLog::open(dir.join(LOG_FILE_NAME)).expect("open provenance log");
    let backend: Arc<dyn WorkerBackend> = backend.clone();
    TaskScheduler::new(backend, WorkerCommand::new("worker", vec![]), log, options)
}

#[tokio::test]
async fn all_tasks_succeed_on_first_attempt() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let backend = ScriptedBackend::new().into_shared();
    let sched = scheduler(&backend, dir.path(), SchedulerOptions::default());

    let batch = with_timeout(sched.run(tasks(&["soccer", "tennis", "golf"]), dir.path())).await?;

    assert_eq!(batch.launched(), 3);
    assert_eq!(batch.succeeded(), 3);
    assert_eq!(batch.failed(), 0);
    assert_eq!(batch.retries(), 0);
    for report in batch.reports() {
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.outcome, TaskOutcome::Succeeded);
        assert!(dir.path().join(report.label()).is_dir());
    }

    let events = read_jsonl(&dir.path().join(LOG_FILE_NAME));
    assert_eq!(events.first().unwrap()["action"], "launch_all_workers");
    assert_eq!(events.last().unwrap()["action"], "workers_complete");
    assert_eq!(events.last().unwrap()["details"]["succeeded"], 3);
    Ok(())
}

#[tokio::test]
async fn failed_first_attempt_is_retried_once_and_succeeds() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let backend = ScriptedBackend::new()
        .on_attempt("tennis", 1, Scripted::Fail(1))
        .into_shared();
    let sched = scheduler(&backend, dir.path(), SchedulerOptions::default());

    let batch = with_timeout(sched.run(tasks(&["soccer", "tennis"]), dir.path())).await?;

    assert_eq!(batch.succeeded(), 2);
    assert_eq!(batch.retries(), 1);
    let tennis = batch.report("tennis").unwrap();
    assert_eq!(tennis.attempts.len(), 2);
    assert_eq!(tennis.attempts[0].status, AttemptStatus::Failure);
    assert_eq!(tennis.attempts[1].status, AttemptStatus::Success);
    assert_eq!(tennis.outcome, TaskOutcome::Succeeded);
    assert_eq!(backend.attempts_for("tennis"), 2);
    assert_eq!(backend.attempts_for("soccer"), 1);

    let events = read_jsonl(&dir.path().join(LOG_FILE_NAME));
    assert_eq!(
        actions(&events_for_task(&events, "tennis")),
        ["launch_worker", "failed", "retry_worker", "launch_worker", "complete"]
    );
    assert_eq!(
        actions(&events_for_task(&events, "soccer")),
        ["launch_worker", "complete"]
    );
    Ok(())
}

#[tokio::test]
async fn task_failing_twice_is_failed_and_others_are_unaffected() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let backend = ScriptedBackend::new()
        .always("cricket", Scripted::Fail(2))
        .into_shared();
    let sched = scheduler(&backend, dir.path(), SchedulerOptions::default());

    let batch = with_timeout(sched.run(tasks(&["soccer", "cricket", "golf"]), dir.path())).await?;

    assert_eq!(batch.launched(), 3);
    assert_eq!(batch.succeeded(), 2);
    assert_eq!(batch.failed(), 1);
    let cricket = batch.report("cricket").unwrap();
    assert_eq!(cricket.outcome, TaskOutcome::Failed);
    assert_eq!(cricket.attempts.len(), 2);
    assert_eq!(cricket.error().as_deref(), Some("scripted failure 2"));
    assert_eq!(backend.attempts_for("cricket"), 2);

    let events = read_jsonl(&dir.path().join(LOG_FILE_NAME));
    let failed: Vec<_> = events_for_task(&events, "cricket")
        .into_iter()
        .filter(|e| e["action"] == "failed")
        .collect();
    assert_eq!(failed.len(), 2);
    assert_eq!(failed[0]["actor"], "worker_cricket");
    assert_eq!(failed[0]["details"]["return_code"], 2);
    Ok(())
}

#[tokio::test]
async fn timed_out_attempt_is_logged_as_timeout_and_retried() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let backend = ScriptedBackend::new()
        .on_attempt("golf", 1, Scripted::TimeOut)
        .into_shared();
    let options = SchedulerOptions {
        attempt_timeout: Duration::from_secs(5),
        ..SchedulerOptions::default()
    };
    let sched = scheduler(&backend, dir.path(), options);

    let batch = with_timeout(sched.run(tasks(&["golf"]), dir.path())).await?;

    let golf = batch.report("golf").unwrap();
    assert_eq!(golf.attempts[0].status, AttemptStatus::TimedOut);
    assert_eq!(golf.attempts[1].status, AttemptStatus::Success);
    assert!(golf.succeeded());

    let events = read_jsonl(&dir.path().join(LOG_FILE_NAME));
    let golf_events = events_for_task(&events, "golf");
    assert_eq!(
        actions(&golf_events),
        ["launch_worker", "timeout", "retry_worker", "launch_worker", "complete"]
    );
    assert_eq!(golf_events[1]["details"]["duration_s"], 5.0);
    Ok(())
}

#[tokio::test]
async fn timing_out_twice_fails_the_task() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let backend = ScriptedBackend::new()
        .always("golf", Scripted::TimeOut)
        .into_shared();
    let sched = scheduler(&backend, dir.path(), SchedulerOptions::default());

    let batch = with_timeout(sched.run(tasks(&["golf", "rugby"]), dir.path())).await?;

    let golf = batch.report("golf").unwrap();
    assert_eq!(golf.outcome, TaskOutcome::Failed);
    assert!(golf.attempts.iter().all(|a| a.status == AttemptStatus::TimedOut));
    assert!(golf.error().unwrap().contains("timed out"));
    assert_eq!(batch.failed(), 1);
    Ok(())
}

#[tokio::test]
async fn disabled_retry_launches_each_task_once() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let backend = ScriptedBackend::new()
        .always("tennis", Scripted::Fail(1))
        .into_shared();
    let options = SchedulerOptions {
        retry: RetryPolicy::disabled(),
        ..SchedulerOptions::default()
    };
    let sched = scheduler(&backend, dir.path(), options);

    let batch = with_timeout(sched.run(tasks(&["tennis", "golf"]), dir.path())).await?;

    assert_eq!(batch.failed(), 1);
    assert_eq!(batch.retries(), 0);
    assert_eq!(backend.attempts_for("tennis"), 1);

    let events = read_jsonl(&dir.path().join(LOG_FILE_NAME));
    assert!(events.iter().all(|e| e["action"] != "retry_worker"));
    Ok(())
}

#[tokio::test]
async fn larger_retry_bound_allows_more_attempts() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let backend = ScriptedBackend::new()
        .always("tennis", Scripted::Fail(1))
        .into_shared();
    let options = SchedulerOptions {
        retry: RetryPolicy::with_bound(2),
        ..SchedulerOptions::default()
    };
    let sched = scheduler(&backend, dir.path(), options);

    let batch = with_timeout(sched.run(tasks(&["tennis"]), dir.path())).await?;

    let tennis = batch.report("tennis").unwrap();
    let numbers: Vec<u32> = tennis.attempts.iter().map(|a| a.number).collect();
    assert_eq!(numbers, [1, 2, 3]);
    assert_eq!(backend.attempts_for("tennis"), 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_limit_bounds_live_workers() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let backend = ScriptedBackend::new()
        .with_delay(Duration::from_millis(50))
        .into_shared();
    let options = SchedulerOptions {
        concurrency: Some(2),
        ..SchedulerOptions::default()
    };
    let sched = scheduler(&backend, dir.path(), options);

    let labels = ["a", "b", "c", "d", "e", "f"];
    let batch = with_timeout(sched.run(tasks(&labels), dir.path())).await?;

    assert_eq!(batch.succeeded(), labels.len());
    assert!(backend.max_in_flight() <= 2, "saw {}", backend.max_in_flight());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn without_a_limit_every_task_runs_at_once() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let backend = ScriptedBackend::new()
        .with_delay(Duration::from_millis(300))
        .into_shared();
    let sched = scheduler(&backend, dir.path(), SchedulerOptions::default());

    let labels = ["a", "b", "c", "d", "e"];
    with_timeout(sched.run(tasks(&labels), dir.path())).await?;

    assert_eq!(backend.max_in_flight(), labels.len());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reports_keep_submission_order() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let backend = ScriptedBackend::new()
        .on_attempt("alpha", 1, Scripted::Fail(1))
        .with_delay(Duration::from_millis(10))
        .into_shared();
    let sched = scheduler(&backend, dir.path(), SchedulerOptions::default());

    let labels = ["zulu", "alpha", "mike", "bravo"];
    let batch = with_timeout(sched.run(tasks(&labels), dir.path())).await?;

    let order: Vec<&str> = batch.reports().iter().map(|r| r.label()).collect();
    assert_eq!(order, labels);
    Ok(())
}

#[tokio::test]
async fn unspawnable_worker_for_one_task_is_a_task_failure() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let backend = ScriptedBackend::new()
        .always("golf", Scripted::SpawnError)
        .into_shared();
    let sched = scheduler(&backend, dir.path(), SchedulerOptions::default());

    let batch = with_timeout(sched.run(tasks(&["golf", "tennis"]), dir.path())).await?;

    let golf = batch.report("golf").unwrap();
    assert_eq!(golf.outcome, TaskOutcome::Failed);
    assert!(golf.never_spawned());
    assert!(golf.error().unwrap().contains("scripted spawn failure"));
    assert!(batch.report("tennis").unwrap().succeeded());

    let events = read_jsonl(&dir.path().join(LOG_FILE_NAME));
    assert_eq!(
        actions(&events_for_task(&events, "golf")),
        ["launch_worker", "spawn_error", "retry_worker", "launch_worker", "spawn_error"]
    );
    Ok(())
}

#[tokio::test]
async fn no_worker_spawning_at_all_is_an_infrastructure_failure() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let backend = ScriptedBackend::new()
        .always("golf", Scripted::SpawnError)
        .always("tennis", Scripted::SpawnError)
        .into_shared();
    let sched = scheduler(&backend, dir.path(), SchedulerOptions::default());

    let err = with_timeout(sched.run(tasks(&["golf", "tennis"]), dir.path()))
        .await
        .unwrap_err();

    assert!(err.is_infrastructure(), "unexpected error: {err}");
    let events = read_jsonl(&dir.path().join(LOG_FILE_NAME));
    assert_eq!(events.last().unwrap()["action"], "no_worker_spawned");
    assert!(events.iter().all(|e| e["action"] != "workers_complete"));
    Ok(())
}

#[tokio::test]
async fn empty_task_list_is_rejected_before_anything_runs() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let backend = ScriptedBackend::new().into_shared();
    let sched = scheduler(&backend, dir.path(), SchedulerOptions::default());

    let err = sched.run(vec![], dir.path()).await.unwrap_err();

    assert!(matches!(err, OrchestratorError::ConfigError(_)));
    assert!(backend.calls().is_empty());
    assert!(read_jsonl(&dir.path().join(LOG_FILE_NAME)).is_empty());
    Ok(())
}

#[tokio::test]
async fn metadata_descriptor_is_attached_to_successful_tasks_only() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let backend = ScriptedBackend::new()
        .always("golf", Scripted::Fail(1))
        .writes_metadata("golf", 2, json!({"poems": 0}))
        .writes_metadata("tennis", 1, json!({"poems": 3}))
        .into_shared();
    let sched = scheduler(&backend, dir.path(), SchedulerOptions::default());

    let batch = with_timeout(sched.run(tasks(&["golf", "tennis"]), dir.path())).await?;

    assert!(batch.report("golf").unwrap().metadata.is_none());
    assert_eq!(batch.report("tennis").unwrap().metadata.as_ref().unwrap()["poems"], 3);
    Ok(())
}

#[tokio::test]
async fn descriptor_from_a_failed_attempt_does_not_survive_the_retry() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let backend = ScriptedBackend::new()
        .on_attempt("golf", 1, Scripted::Fail(1))
        .writes_metadata("golf", 1, json!({"stale": true}))
        .into_shared();

    // Left over from outside the run as well.
    std::fs::create_dir_all(dir.path().join("tennis"))?;
    std::fs::write(dir.path().join("tennis").join("metadata.json"), r#"{"stale": true}"#)?;

    let sched = scheduler(&backend, dir.path(), SchedulerOptions::default());
    let batch = with_timeout(sched.run(tasks(&["golf", "tennis"]), dir.path())).await?;

    let golf = batch.report("golf").unwrap();
    assert!(golf.succeeded());
    assert_eq!(golf.attempts.len(), 2);
    assert!(golf.metadata.is_none());
    assert!(batch.report("tennis").unwrap().metadata.is_none());
    Ok(())
}

#[tokio::test]
async fn unsafe_or_duplicate_labels_are_rejected_before_launch() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let root = dir.path().join("session");
    std::fs::create_dir(&root)?;
    let backend = ScriptedBackend::new().into_shared();
    let sched = scheduler(&backend, &root, SchedulerOptions::default());

    let cases: [&[&str]; 4] = [
        &["../escape", "golf"],
        &["golf", "golf"],
        &["golf", ""],
        &["nested/dir"],
    ];
    for labels in cases {
        let err = sched.run(tasks(labels), &root).await.unwrap_err();
        assert!(
            matches!(err, OrchestratorError::ConfigError(_)),
            "{labels:?}: unexpected error {err}"
        );
    }

    assert!(backend.calls().is_empty());
    assert!(!dir.path().join("escape").exists());
    assert!(!root.join("golf").exists());
    assert!(read_jsonl(&root.join(LOG_FILE_NAME)).is_empty());
    Ok(())
}

#[tokio::test]
async fn retry_waits_for_the_configured_delay() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let backend = ScriptedBackend::new()
        .on_attempt("golf", 1, Scripted::Fail(1))
        .into_shared();
    let delay = Duration::from_millis(100);
    let options = SchedulerOptions {
        retry: RetryPolicy {
            delay,
            ..RetryPolicy::default()
        },
        ..SchedulerOptions::default()
    };
    let sched = scheduler(&backend, dir.path(), options);

    let batch = with_timeout(sched.run(tasks(&["golf", "tennis"]), dir.path())).await?;

    let golf = batch.report("golf").unwrap();
    assert!(golf.succeeded());
    let gap = (golf.attempts[1].started_at - golf.attempts[0].finished_at).to_std()?;
    assert!(gap >= delay, "relaunched after {gap:?}");

    // Tasks that did not fail are not delayed.
    assert_eq!(batch.report("tennis").unwrap().attempts.len(), 1);
    Ok(())
}
