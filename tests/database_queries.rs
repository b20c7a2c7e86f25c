// tests/database_queries.rs

mod common;
use crate::common::{init_tracing, memory_engine, Counter};

use memodag::database::where_;
use memodag::{
    field, DatasetStatus, Direction, Field, JobGraph, Query, Task, TaskOutput, Value, ValueType,
};
use memodag_test_utils::{double_task, failing_task};

/// Runs double(1..=4) and one failing job; returns the engine.
async fn populated() -> memodag::Engine {
    let engine = memory_engine();
    let calls = Counter::new();
    let double = engine.register_task(double_task(&calls).build().unwrap()).unwrap();
    let failing = engine.register_task(failing_task(&calls).build().unwrap()).unwrap();

    let mut graph = JobGraph::new();
    for x in 1..=4 {
        graph.add(&double, [("x", x)]).unwrap();
    }
    graph.add(&failing, [("x", 0)]).unwrap();
    engine.await_result(engine.submit_graph(graph).unwrap()).await.unwrap();
    engine
}

#[tokio::test]
async fn filters_by_status_and_task() {
    init_tracing();
    let engine = populated().await;

    let succeeded = engine
        .query(where_(field(Field::Status).eq(DatasetStatus::Succeeded)))
        .fetch()
        .unwrap();
    assert_eq!(succeeded.len(), 4);
    assert!(succeeded.iter().all(|r| r.task == "double"));

    // Status strings are matched regardless of case.
    let spelled = engine
        .query(where_(field(Field::Task).eq("double")).and_where(field(Field::Status).eq("Succeeded")))
        .fetch()
        .unwrap();
    assert_eq!(spelled.len(), 4);

    let failed = engine
        .query(where_(field(Field::Task).eq("failing")).and_where(field(Field::Status).ne(DatasetStatus::Succeeded)))
        .fetch()
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].artifact.is_none());
    assert_eq!(failed[0].failure.as_ref().unwrap().kind.as_str(), "logic");
}

#[tokio::test]
async fn ranges_sets_and_negation() {
    init_tracing();
    let engine = populated().await;
    let db = engine.database();

    assert_eq!(db.count(where_(field(Field::Job).between(1, 2))).unwrap(), 2);
    assert_eq!(db.count(where_(field(Field::Job).is_in([0, 3, 99]))).unwrap(), 2);
    assert_eq!(
        db.count(where_(field(Field::Task).eq("double").not())).unwrap(),
        1
    );
    assert_eq!(
        db.count(where_(field(Field::Job).lt(1)).or_where(field(Field::Job).ge(4)))
            .unwrap(),
        2
    );
    // Succeeded rows have no failure kind; only `ne` matches a missing field.
    assert_eq!(db.count(where_(field(Field::FailureKind).ne("logic"))).unwrap(), 4);
}

#[tokio::test]
async fn ordering_and_limit() {
    init_tracing();
    let engine = populated().await;

    let rows = engine
        .query(
            where_(field(Field::Task).eq("double"))
                .order_by(Field::Job, Direction::Desc)
                .limit(2),
        )
        .fetch()
        .unwrap();
    let jobs: Vec<usize> = rows.iter().map(|r| r.job.0).collect();
    assert_eq!(jobs, vec![3, 2]);

    let rows = engine
        .query(Query::all().order_by(Field::CreatedAt, Direction::Asc))
        .fetch()
        .unwrap();
    assert!(rows.windows(2).all(|w| w[0].created_at <= w[1].created_at));
}

#[tokio::test]
async fn rows_reflect_later_inserts() {
    init_tracing();
    let engine = memory_engine();
    let calls = Counter::new();
    let double = engine.register_task(double_task(&calls).build().unwrap()).unwrap();

    let rows = engine.query(where_(field(Field::Task).eq("double")));
    assert_eq!(rows.fetch().unwrap().len(), 0);

    engine
        .await_result(engine.submit(&double, [("x", 9)]).unwrap())
        .await
        .unwrap();
    assert_eq!(rows.iter().unwrap().count(), 1);
}

#[tokio::test]
async fn metadata_is_queryable_and_history_is_per_fingerprint() {
    init_tracing();
    let engine = memory_engine();
    let count_rows = engine
        .register_task(
            Task::builder("count_rows", 1)
                .input("n", ValueType::Int)
                .output(ValueType::Int)
                .compute(|ctx| async move {
                    let n = ctx.inputs.int("n")?;
                    Ok(TaskOutput::new(n).with_metadata("rows", n).with_metadata("source", "test"))
                })
                .build()
                .unwrap(),
        )
        .unwrap();

    let mut fingerprints = Vec::new();
    for n in [3, 30, 300] {
        let report = engine
            .await_result(engine.submit(&count_rows, [("n", n)]).unwrap())
            .await
            .unwrap();
        fingerprints.push(report.job(report.target()).unwrap().fingerprint);
    }

    let big = engine
        .query(where_(field(Field::meta("rows")).gt(10)))
        .fetch()
        .unwrap();
    assert_eq!(big.len(), 2);
    assert!(big.iter().all(|r| r.metadata.get("source") == Some(&Value::from("test"))));

    let history = engine.database().history(&fingerprints[1]).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].metadata.get("rows"), Some(&Value::Int(30)));
    assert_eq!(
        history[0].artifact.as_ref().unwrap().key,
        fingerprints[1].to_hex()
    );
}
