// tests/memoization.rs

mod common;
use crate::common::{init_tracing, memory_engine, with_timeout, Counter};

use std::time::Duration;

use memodag::database::where_;
use memodag::{field, DatasetStatus, Field, JobGraph, Value};
use memodag_test_utils::{double_task, slow_task, sum_task};

#[tokio::test]
async fn double_twice_computes_once() {
    init_tracing();
    let engine = memory_engine();
    let calls = Counter::new();
    let double = engine.register_task(double_task(&calls).build().unwrap()).unwrap();

    let first = with_timeout(engine.await_result(engine.submit(&double, [("x", 3)]).unwrap()))
        .await
        .unwrap();
    assert_eq!(first.value().unwrap(), Value::Int(6));
    assert_eq!(first.computed_jobs().len(), 1);

    let second = with_timeout(engine.await_result(engine.submit(&double, [("x", 3)]).unwrap()))
        .await
        .unwrap();
    assert_eq!(second.value().unwrap(), Value::Int(6));
    assert!(second.job(second.target()).unwrap().from_cache);
    assert!(second.computed_jobs().is_empty());

    assert_eq!(calls.get(), 1);

    let rows = engine
        .query(where_(field(Field::Task).eq("double")))
        .fetch()
        .unwrap();
    assert_eq!(rows.len(), 1, "cache hits produce no row");
    assert_eq!(rows[0].status, DatasetStatus::Succeeded);
    assert_eq!(rows[0].fingerprint, first.job(first.target()).unwrap().fingerprint);
}

#[tokio::test]
async fn different_inputs_are_computed_separately() {
    init_tracing();
    let engine = memory_engine();
    let calls = Counter::new();
    let double = engine.register_task(double_task(&calls).build().unwrap()).unwrap();

    for x in [1, 2, 1, 2, 3] {
        let report = engine
            .await_result(engine.submit(&double, [("x", x)]).unwrap())
            .await
            .unwrap();
        assert_eq!(report.value().unwrap(), Value::Int(2 * i64::from(x)));
    }
    assert_eq!(calls.get(), 3);
}

#[tokio::test]
async fn shared_upstream_is_reused_across_graphs() {
    init_tracing();
    let engine = memory_engine();
    let doubles = Counter::new();
    let sums = Counter::new();
    let double = engine.register_task(double_task(&doubles).build().unwrap()).unwrap();
    let sum = engine.register_task(sum_task(&sums).build().unwrap()).unwrap();

    for b in [1, 2] {
        let mut graph = JobGraph::new();
        let d = graph.add(&double, [("x", 5)]).unwrap();
        graph
            .add(&sum, [("a", d.into()), ("b", memodag::Binding::literal(b))])
            .unwrap();
        let report = engine.await_result(engine.submit_graph(graph).unwrap()).await.unwrap();
        assert_eq!(report.value().unwrap(), Value::Int(10 + b));
    }

    assert_eq!(doubles.get(), 1);
    assert_eq!(sums.get(), 2);
}

#[tokio::test]
async fn bumping_the_task_version_recomputes() {
    init_tracing();
    let engine = memory_engine();
    let calls = Counter::new();
    let v1 = engine.register_task(double_task(&calls).build().unwrap()).unwrap();

    engine
        .await_result(engine.submit(&v1, [("x", 3)]).unwrap())
        .await
        .unwrap();

    let v2 = memodag::Task::builder("double", 2)
        .input("x", memodag::ValueType::Int)
        .output(memodag::ValueType::Int)
        .compute(|ctx| async move { Ok(memodag::TaskOutput::new(ctx.inputs.int("x")? * 2)) })
        .build()
        .unwrap();
    let v2 = engine.register_task(v2).unwrap();
    let report = engine
        .await_result(engine.submit(&v2, [("x", 3)]).unwrap())
        .await
        .unwrap();

    assert!(!report.job(report.target()).unwrap().from_cache);
    assert_eq!(calls.get(), 1, "v2 has its own compute function");
    assert_eq!(engine.cache().stats().commits, 2);
}

#[tokio::test]
async fn concurrent_runs_compute_a_fingerprint_once() {
    init_tracing();
    let engine = memory_engine();
    let calls = Counter::new();
    let slow = engine
        .register_task(slow_task(&calls, Duration::from_millis(100)).build().unwrap())
        .unwrap();

    let handles: Vec<_> = (0..5)
        .map(|_| engine.submit(&slow, [("x", 7)]).unwrap())
        .collect();

    let mut computed = 0;
    for handle in handles {
        let report = with_timeout(engine.await_result(handle)).await.unwrap();
        assert_eq!(report.value().unwrap(), Value::Int(7));
        computed += report.computed_jobs().len();
    }

    assert_eq!(calls.get(), 1);
    assert_eq!(computed, 1);
    let stats = engine.cache().stats();
    assert_eq!(stats.computes, 1);
    assert_eq!(stats.in_flight, 0);
}
