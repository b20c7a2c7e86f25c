// tests/failure_handling.rs

mod common;
use crate::common::{init_tracing, memory_engine, with_timeout, Counter};

use std::time::Duration;

use memodag::dag::JobState;
use memodag::database::where_;
use memodag::{
    field, DatasetStatus, Engine, EngineConfig, FailureKind, FailurePolicy, Field, JobGraph,
    Task, TaskOutput, Value, ValueType,
};
use memodag_test_utils::{double_task, failing_task, flaky_task, slow_task};

#[tokio::test]
async fn flaky_job_succeeds_within_retry_budget() {
    init_tracing();
    let engine = memory_engine();
    let calls = Counter::new();
    let flaky = engine
        .register_task(flaky_task(&calls, 1).max_retries(2).build().unwrap())
        .unwrap();

    let report = with_timeout(
        engine.await_result(engine.submit(&flaky, Vec::<(&str, i64)>::new()).unwrap()),
    )
    .await
    .unwrap();

    let job = report.job(report.target()).unwrap();
    assert_eq!(job.state, JobState::Succeeded);
    assert_eq!(job.attempts, 2);
    assert_eq!(report.value().unwrap(), Value::Int(42));

    let rows = engine
        .query(where_(field(Field::Task).eq("flaky")).order_by(Field::Attempt, Default::default()))
        .fetch()
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].status, DatasetStatus::Failed);
    assert_eq!(rows[0].failure.as_ref().unwrap().kind, FailureKind::Timeout);
    assert_eq!(rows[1].status, DatasetStatus::Succeeded);
    assert_eq!(rows[1].attempt, 2);

    assert_eq!(engine.cache().store().keys().unwrap().len(), 1);
}

#[tokio::test]
async fn exhausted_retries_fail_the_job() {
    init_tracing();
    let engine = memory_engine();
    let calls = Counter::new();
    let flaky = engine
        .register_task(flaky_task(&calls, 10).max_retries(1).build().unwrap())
        .unwrap();

    let report = engine
        .await_result(engine.submit(&flaky, Vec::<(&str, i64)>::new()).unwrap())
        .await
        .unwrap();

    let failure = report.outcome().unwrap_err();
    assert_eq!(failure.kind, FailureKind::Timeout);
    assert_eq!(report.job(report.target()).unwrap().attempts, 2);
    assert_eq!(calls.get(), 2);
    assert_eq!(
        engine
            .database()
            .count(where_(field(Field::Status).eq(DatasetStatus::Failed)))
            .unwrap(),
        2
    );
    assert!(engine.cache().store().keys().unwrap().is_empty());
}

#[tokio::test]
async fn logic_failures_retry_only_when_idempotent() {
    init_tracing();
    let engine = memory_engine();

    let once = Counter::new();
    let failing = engine.register_task(failing_task(&once).build().unwrap()).unwrap();
    let report = engine
        .await_result(engine.submit(&failing, [("x", 1)]).unwrap())
        .await
        .unwrap();
    assert_eq!(report.outcome().unwrap_err().kind, FailureKind::Logic);
    assert_eq!(once.get(), 1);

    let engine = memory_engine();
    let thrice = Counter::new();
    let idempotent = engine
        .register_task(failing_task(&thrice).idempotent(true).build().unwrap())
        .unwrap();
    engine
        .await_result(engine.submit(&idempotent, [("x", 1)]).unwrap())
        .await
        .unwrap();
    assert_eq!(thrice.get(), 3);
}

#[tokio::test]
async fn failure_is_isolated_to_dependents() {
    init_tracing();
    let engine = memory_engine();
    let doubles = Counter::new();
    let failures = Counter::new();
    let double = engine.register_task(double_task(&doubles).build().unwrap()).unwrap();
    let failing = engine
        .register_task(
            failing_task(&failures)
                .idempotent(true)
                .max_retries(1)
                .build()
                .unwrap(),
        )
        .unwrap();

    // A -> B -> C, plus an unrelated D.
    let mut graph = JobGraph::new();
    let a = graph.add(&double, [("x", 3)]).unwrap();
    let b = graph.add(&failing, [("x", a)]).unwrap();
    let d = graph.add(&double, [("x", 4)]).unwrap();
    let c = graph.add(&double, [("x", b)]).unwrap();

    let report = with_timeout(engine.await_result(engine.submit_graph(graph).unwrap()))
        .await
        .unwrap();

    assert_eq!(report.job(a).unwrap().state, JobState::Succeeded);
    assert_eq!(report.job(b).unwrap().state, JobState::Failed);
    assert_eq!(report.job(b).unwrap().attempts, 2);
    assert_eq!(report.job(d).unwrap().state, JobState::Succeeded);

    let skipped = report.job(c).unwrap();
    assert_eq!(skipped.state, JobState::Skipped);
    assert_eq!(skipped.attempts, 0);
    assert_eq!(
        skipped.failure.as_ref().unwrap().kind,
        FailureKind::DependencyFailed
    );
    assert_eq!(report.outcome().unwrap_err().kind, FailureKind::DependencyFailed);
    assert!(!report.is_success());

    let run = where_(field(Field::RunId).eq(report.run_id()));
    let skipped_rows = engine
        .query(run.clone().and_where(field(Field::Status).eq(DatasetStatus::Skipped)))
        .fetch()
        .unwrap();
    assert_eq!(skipped_rows.len(), 1);
    assert_eq!(skipped_rows[0].job, c);
    assert_eq!(engine.database().count(run).unwrap(), 5, "A, D, two B attempts, C");
    assert_eq!(failures.get(), 2);
}

#[tokio::test]
async fn tolerant_job_runs_with_absent_input() {
    init_tracing();
    let engine = memory_engine();
    let failures = Counter::new();
    let failing = engine.register_task(failing_task(&failures).build().unwrap()).unwrap();
    let coalesce = engine
        .register_task(
            Task::builder("coalesce", 1)
                .input("x", ValueType::Int)
                .output(ValueType::Int)
                .failure_policy(FailurePolicy::Tolerate)
                .compute(|ctx| async move {
                    let x = if ctx.inputs.is_absent("x") {
                        -1
                    } else {
                        ctx.inputs.int("x")?
                    };
                    Ok(TaskOutput::new(x))
                })
                .build()
                .unwrap(),
        )
        .unwrap();

    let mut graph = JobGraph::new();
    let b = graph.add(&failing, [("x", 1)]).unwrap();
    let c = graph.add(&coalesce, [("x", b)]).unwrap();

    let report = engine.await_result(engine.submit_graph(graph).unwrap()).await.unwrap();
    assert_eq!(report.job(b).unwrap().state, JobState::Failed);
    assert_eq!(report.job(c).unwrap().state, JobState::Succeeded);
    assert_eq!(report.value().unwrap(), Value::Int(-1));
}

#[tokio::test]
async fn job_exceeding_its_timeout_fails() {
    init_tracing();
    let engine = memory_engine();
    let calls = Counter::new();
    let slow = engine
        .register_task(
            slow_task(&calls, Duration::from_secs(2))
                .timeout(Duration::from_millis(20))
                .max_retries(1)
                .build()
                .unwrap(),
        )
        .unwrap();

    let report = with_timeout(engine.await_result(engine.submit(&slow, [("x", 1)]).unwrap()))
        .await
        .unwrap();

    let job = report.job(report.target()).unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempts, 2, "timeouts are retryable");
    assert_eq!(report.outcome().unwrap_err().kind, FailureKind::Timeout);
    assert_eq!(engine.cache().stats().in_flight, 0);
}

#[tokio::test]
async fn engine_default_timeout_applies() {
    init_tracing();
    let config = EngineConfig::in_memory()
        .with_retry(common::fast_retry(0))
        .with_job_timeout(Duration::from_millis(20));
    let engine = Engine::new(config).unwrap();
    let calls = Counter::new();
    let slow = engine
        .register_task(slow_task(&calls, Duration::from_secs(2)).build().unwrap())
        .unwrap();

    let report = with_timeout(engine.await_result(engine.submit(&slow, [("x", 1)]).unwrap()))
        .await
        .unwrap();
    assert_eq!(report.outcome().unwrap_err().kind, FailureKind::Timeout);
}

#[tokio::test]
async fn panicking_compute_is_a_logic_failure() {
    init_tracing();
    let engine = memory_engine();
    let boom = engine
        .register_task(
            Task::builder("boom", 1)
                .output(ValueType::Int)
                .compute(|_ctx| async move {
                    if true {
                        panic!("boom");
                    }
                    Ok(TaskOutput::new(0))
                })
                .build()
                .unwrap(),
        )
        .unwrap();

    let report = engine
        .await_result(engine.submit(&boom, Vec::<(&str, i64)>::new()).unwrap())
        .await
        .unwrap();
    assert_eq!(report.outcome().unwrap_err().kind, FailureKind::Logic);
}
