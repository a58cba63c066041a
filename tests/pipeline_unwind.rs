// tests/pipeline_unwind.rs

mod common;
use crate::common::recording_task::{
    entered, exited, recording_registry, Behaviour, Event, EventLog,
};
use crate::common::{fake_context, init_tracing, TestResult};

use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use teuthology::config::TaskEntry;
use teuthology::context::RunContext;
use teuthology::engine::Pipeline;
use teuthology::errors::{Phase, TeuthologyError};
use teuthology::tasks::{Task, TaskRegistry};

fn entries(names: &[&str]) -> Vec<TaskEntry> {
    names.iter().map(|n| TaskEntry::bare(*n)).collect()
}

#[tokio::test]
async fn all_stages_enter_in_order_and_exit_in_reverse() -> TestResult {
    init_tracing();
    let log = EventLog::default();
    let registry = recording_registry(
        &log,
        &[("a", Behaviour::Succeed), ("b", Behaviour::Succeed), ("c", Behaviour::Succeed)],
    );
    let (mut ctx, _) = fake_context(1);

    let pipeline = Pipeline::resolve(&registry, &entries(&["a", "b", "c"]))?;
    let report = pipeline.run(&mut ctx).await;

    assert!(report.is_success());
    assert_eq!(report.entered, vec!["a", "b", "c"]);
    assert_eq!(report.exited, vec!["c", "b", "a"]);
    assert!(report.skipped.is_empty());
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            Event::Enter("a".into()),
            Event::Enter("b".into()),
            Event::Enter("c".into()),
            Event::Exit("c".into()),
            Event::Exit("b".into()),
            Event::Exit("a".into()),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn enter_failure_unwinds_only_entered_stages() -> TestResult {
    init_tracing();
    let log = EventLog::default();
    let registry = recording_registry(
        &log,
        &[("a", Behaviour::Succeed), ("b", Behaviour::FailEnter), ("c", Behaviour::Succeed)],
    );
    let (mut ctx, _) = fake_context(1);

    let report = Pipeline::resolve(&registry, &entries(&["a", "b", "c"]))?
        .run(&mut ctx)
        .await;

    assert_eq!(report.entered, vec!["a"]);
    assert_eq!(report.exited, vec!["a"]);
    assert_eq!(report.skipped, vec!["c"]);
    // b's enter was attempted but it never gets an exit; c is never touched.
    assert_eq!(entered(&log), vec!["a", "b"]);
    assert_eq!(exited(&log), vec!["a"]);

    match report.error {
        Some(TeuthologyError::Stage(err)) => {
            assert_eq!(err.stage, "b");
            assert_eq!(err.index, 1);
            assert_eq!(err.phase, Phase::Enter);
        }
        other => panic!("expected enter failure of b, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn failing_exit_does_not_stop_teardown() -> TestResult {
    init_tracing();
    let log = EventLog::default();
    let registry = recording_registry(
        &log,
        &[("a", Behaviour::Succeed), ("b", Behaviour::FailExit), ("c", Behaviour::Succeed)],
    );
    let (mut ctx, _) = fake_context(1);

    let report = Pipeline::resolve(&registry, &entries(&["a", "b", "c"]))?
        .run(&mut ctx)
        .await;

    assert_eq!(exited(&log), vec!["c", "b", "a"]);
    match report.error {
        Some(TeuthologyError::AggregateTeardown { trigger, teardown }) => {
            assert!(trigger.is_none());
            assert_eq!(teardown.len(), 1);
            assert_eq!(teardown[0].stage, "b");
            assert_eq!(teardown[0].phase, Phase::Exit);
        }
        other => panic!("expected aggregate teardown error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn enter_and_exit_failures_are_reported_together() -> TestResult {
    init_tracing();
    let log = EventLog::default();
    let registry = recording_registry(
        &log,
        &[
            ("a", Behaviour::FailExit),
            ("b", Behaviour::FailExit),
            ("c", Behaviour::FailEnter),
        ],
    );
    let (mut ctx, _) = fake_context(1);

    let report = Pipeline::resolve(&registry, &entries(&["a", "b", "c"]))?
        .run(&mut ctx)
        .await;
    let err = report.error.expect("run must fail");

    assert_eq!(err.exit_code(), 1);
    let messages = err.flatten();
    assert_eq!(messages.len(), 3, "{messages:?}");
    assert!(messages[0].contains("'c'"));

    match err {
        TeuthologyError::AggregateTeardown { trigger, teardown } => {
            assert!(matches!(trigger.as_deref(), Some(TeuthologyError::Stage(e)) if e.stage == "c"));
            let stages: Vec<_> = teardown.iter().map(|e| e.stage.as_str()).collect();
            assert_eq!(stages, vec!["b", "a"]);
        }
        other => panic!("expected aggregate teardown error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn panics_are_stage_failures() -> TestResult {
    init_tracing();
    let log = EventLog::default();
    let registry = recording_registry(
        &log,
        &[
            ("a", Behaviour::Succeed),
            ("b", Behaviour::PanicExit),
            ("c", Behaviour::PanicEnter),
        ],
    );
    let (mut ctx, _) = fake_context(1);

    let report = Pipeline::resolve(&registry, &entries(&["a", "b", "c"]))?
        .run(&mut ctx)
        .await;

    assert_eq!(exited(&log), vec!["b", "a"]);
    let messages = report.error.expect("run must fail").flatten();
    assert!(messages.iter().any(|m| m.contains("c blew up on enter")));
    assert!(messages.iter().any(|m| m.contains("b blew up on exit")));
    Ok(())
}

#[tokio::test]
async fn unknown_task_fails_resolution_before_anything_runs() {
    init_tracing();
    let log = EventLog::default();
    let registry = recording_registry(&log, &[("a", Behaviour::Succeed)]);

    let err = Pipeline::resolve(&registry, &entries(&["a", "does.not.exist"])).unwrap_err();

    assert!(matches!(err, TeuthologyError::UnknownTask(ref n) if n == "does.not.exist"));
    assert_eq!(err.exit_code(), 2);
    assert!(log.lock().unwrap().is_empty());
}

/// Remembers the trigger each exit was handed.
struct TriggerRecorder {
    fail_enter: bool,
    seen: Arc<Mutex<Vec<Option<String>>>>,
}

impl Task for TriggerRecorder {
    fn enter<'a>(&'a mut self, _ctx: &'a mut RunContext) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            if self.fail_enter {
                anyhow::bail!("recorder failed");
            }
            Ok(())
        })
    }

    fn exit<'a>(
        &'a mut self,
        _ctx: &'a mut RunContext,
        failure: Option<&'a TeuthologyError>,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.seen.lock().unwrap().push(failure.map(|e| e.to_string()));
            Ok(())
        })
    }
}

#[tokio::test]
async fn exits_see_the_error_that_triggered_unwinding() -> TestResult {
    init_tracing();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut registry = TaskRegistry::empty();
    for (name, fail_enter) in [("ok", false), ("boom", true)] {
        let seen = Arc::clone(&seen);
        registry.register(name, move |_| {
            Ok(Box::new(TriggerRecorder {
                fail_enter,
                seen: Arc::clone(&seen),
            }) as Box<dyn Task>)
        });
    }
    let (mut ctx, _) = fake_context(1);

    let report = Pipeline::resolve(&registry, &entries(&["ok", "ok", "boom"]))?
        .run(&mut ctx)
        .await;

    assert!(!report.is_success());
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    for trigger in seen.iter() {
        let trigger = trigger.as_deref().expect("exit should be given the trigger");
        assert!(trigger.contains("'boom'"), "{trigger}");
    }
    Ok(())
}

#[tokio::test]
async fn clean_run_passes_no_trigger_to_exits() -> TestResult {
    init_tracing();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut registry = TaskRegistry::empty();
    {
        let seen = Arc::clone(&seen);
        registry.register("ok", move |_| {
            Ok(Box::new(TriggerRecorder {
                fail_enter: false,
                seen: Arc::clone(&seen),
            }) as Box<dyn Task>)
        });
    }
    let (mut ctx, _) = fake_context(1);

    Pipeline::resolve(&registry, &entries(&["ok"]))?
        .run(&mut ctx)
        .await
        .into_result()?;

    assert_eq!(*seen.lock().unwrap(), vec![None]);
    Ok(())
}
