// tests/submission_errors.rs

mod common;
use crate::common::{init_tracing, memory_engine, Counter};

use std::sync::Arc;

use memodag::{Binding, EngineError, JobGraph, JobId, Task, TaskOutput, ValueType};
use memodag_test_utils::{double_task, sum_task};

fn echo_str() -> Task {
    Task::builder("echo_str", 1)
        .input("s", ValueType::Str)
        .output(ValueType::Str)
        .compute(|ctx| async move { Ok(TaskOutput::new(ctx.inputs.str("s")?.to_string())) })
        .build()
        .unwrap()
}

#[tokio::test]
async fn empty_graph_is_rejected() {
    init_tracing();
    let engine = memory_engine();
    let err = engine.submit_graph(JobGraph::new()).unwrap_err();
    assert!(matches!(err, EngineError::EmptyGraph));
}

#[tokio::test]
async fn unregistered_task_is_rejected() {
    init_tracing();
    let engine = memory_engine();
    let calls = Counter::new();
    let double = Arc::new(double_task(&calls).build().unwrap());

    let err = engine.submit(&double, [("x", 1)]).unwrap_err();
    assert!(matches!(err, EngineError::TaskNotFound(_)), "got {err:?}");
    assert!(matches!(
        engine.task("double", 1),
        Err(EngineError::TaskNotFound(_))
    ));
}

#[tokio::test]
async fn conflicting_registration_is_rejected() {
    init_tracing();
    let engine = memory_engine();
    let calls = Counter::new();
    engine.register_task(double_task(&calls).build().unwrap()).unwrap();
    // Same spec again is fine.
    engine.register_task(double_task(&calls).build().unwrap()).unwrap();

    let different = Task::builder("double", 1)
        .input("y", ValueType::Int)
        .output(ValueType::Int)
        .compute(|_ctx| async move { Ok(TaskOutput::new(0)) })
        .build()
        .unwrap();
    let err = engine.register_task(different).unwrap_err();
    assert!(matches!(err, EngineError::DuplicateTask(_)));
    assert_eq!(engine.task("double", 1).unwrap().inputs()[0].name, "x");
}

#[tokio::test]
async fn arity_errors() {
    init_tracing();
    let engine = memory_engine();
    let calls = Counter::new();
    let sum = engine.register_task(sum_task(&calls).build().unwrap()).unwrap();

    let err = engine.submit(&sum, [("a", 1)]).unwrap_err();
    assert!(matches!(err, EngineError::Arity { .. }), "missing b: {err:?}");

    let err = engine.submit(&sum, [("a", 1), ("b", 2), ("c", 3)]).unwrap_err();
    assert!(matches!(err, EngineError::Arity { .. }), "extra c: {err:?}");

    let err = engine.submit(&sum, [("a", 1), ("a", 2), ("b", 3)]).unwrap_err();
    assert!(matches!(err, EngineError::Arity { .. }), "a twice: {err:?}");
}

#[tokio::test]
async fn type_mismatches_are_caught_at_submission() {
    init_tracing();
    let engine = memory_engine();
    let calls = Counter::new();
    let double = engine.register_task(double_task(&calls).build().unwrap()).unwrap();
    let echo = engine.register_task(echo_str()).unwrap();

    let err = engine.submit(&double, [("x", "three")]).unwrap_err();
    assert!(matches!(err, EngineError::TypeMismatch { .. }));

    let mut graph = JobGraph::new();
    let s = graph.add(&echo, [("s", "hi")]).unwrap();
    let err = graph.add(&double, [("x", s)]).unwrap_err();
    assert!(matches!(err, EngineError::TypeMismatch { .. }));
}

#[tokio::test]
async fn any_output_is_checked_when_it_arrives() {
    init_tracing();
    let engine = memory_engine();
    let calls = Counter::new();
    let double = engine.register_task(double_task(&calls).build().unwrap()).unwrap();
    let anything = engine
        .register_task(
            Task::builder("anything", 1)
                .output(ValueType::Any)
                .compute(|_ctx| async move { Ok(TaskOutput::new("not a number")) })
                .build()
                .unwrap(),
        )
        .unwrap();

    let mut graph = JobGraph::new();
    let a = graph.add(&anything, Vec::<(&str, Binding)>::new()).unwrap();
    graph.add(&double, [("x", a)]).unwrap();

    let report = engine.await_result(engine.submit_graph(graph).unwrap()).await.unwrap();
    let failure = report.outcome().unwrap_err();
    assert_eq!(failure.kind, memodag::FailureKind::Logic);
    assert_eq!(calls.get(), 0);
}

#[tokio::test]
async fn non_finite_literal_is_a_serialization_error() {
    init_tracing();
    let engine = memory_engine();
    let scale = engine
        .register_task(
            Task::builder("scale", 1)
                .input("f", ValueType::Float)
                .output(ValueType::Float)
                .compute(|ctx| async move { Ok(TaskOutput::new(ctx.inputs.number("f")? * 2.0)) })
                .build()
                .unwrap(),
        )
        .unwrap();

    let err = engine.submit(&scale, [("f", f64::NAN)]).unwrap_err();
    assert!(matches!(err, EngineError::Serialization(_)), "got {err:?}");
}

#[tokio::test]
async fn unknown_job_reference_is_rejected() {
    init_tracing();
    let calls = Counter::new();
    let double = Arc::new(double_task(&calls).build().unwrap());
    let mut graph = JobGraph::new();
    let err = graph.add(&double, [("x", JobId(7))]).unwrap_err();
    assert!(matches!(err, EngineError::UnknownJob(JobId(7))));
}
