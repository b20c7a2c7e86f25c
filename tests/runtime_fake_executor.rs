// tests/runtime_fake_executor.rs

mod common;
use crate::common::{fast_retry, init_tracing, Counter};

use std::collections::BTreeMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use memodag::dag::{JobState, Scheduler};
use memodag::database::Database;
use memodag::engine::{CoreRuntime, RunContext, RunReport, Runtime, RuntimeEvent};
use memodag::fingerprint::{fingerprint, ResolvedInput};
use memodag::{JobFailure, JobGraph, JobId, RetryPolicy, RunId};
use memodag_test_utils::{double_task, FakeExecutor};

type TestResult = Result<(), Box<dyn Error>>;

/// Chain: A -> B, plus an independent C.
fn chain() -> JobGraph {
    let calls = Counter::new();
    let double = Arc::new(double_task(&calls).build().unwrap());
    let mut graph = JobGraph::new();
    let a = graph.add(&double, [("x", 1)]).unwrap();
    graph.add(&double, [("x", a)]).unwrap();
    graph.add(&double, [("x", 2)]).unwrap();
    graph
}

/// Placeholder fingerprints; the fake executor never looks them up.
fn fingerprints(graph: &JobGraph) -> Vec<memodag::Fingerprint> {
    graph
        .jobs()
        .iter()
        .map(|job| {
            let inputs = BTreeMap::from([(
                "x".to_string(),
                ResolvedInput::Literal(memodag::Value::Int(job.id.0 as i64)),
            )]);
            fingerprint(&job.task, &inputs).unwrap()
        })
        .collect()
}

async fn run_with(
    graph: JobGraph,
    workers: usize,
    retry: RetryPolicy,
    script: impl FnOnce(FakeExecutor) -> FakeExecutor,
) -> Result<(RunReport, Vec<(JobId, u32)>, Database), Box<dyn Error>> {
    let (rt_tx, rt_rx) = mpsc::unbounded_channel::<RuntimeEvent>();
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = script(FakeExecutor::new(rt_tx.clone(), executed.clone()));

    let db = Database::in_memory();
    let ctx = RunContext {
        run_id: RunId::new(),
        fingerprints: fingerprints(&graph),
        db: db.clone(),
        job_timeout: None,
        graph,
    };
    let core = CoreRuntime::new(Scheduler::new(&ctx.graph, retry), workers);
    let runtime = Runtime::new(core, ctx, rt_rx, rt_tx, executor);

    let report = timeout(Duration::from_secs(3), runtime.run()).await??;
    let executed = executed.lock().unwrap().clone();
    Ok((report, executed, db))
}

#[tokio::test]
async fn runtime_with_fake_executor_runs_chain_in_order() -> TestResult {
    init_tracing();

    let (report, executed, _db) = run_with(chain(), 4, fast_retry(0), |e| e).await?;

    assert!(report.is_success());
    let order: Vec<JobId> = executed.iter().map(|(job, _)| *job).collect();
    // Roots first in id order, then the dependent.
    assert_eq!(order, vec![JobId(0), JobId(2), JobId(1)]);
    Ok(())
}

#[tokio::test]
async fn runtime_respects_worker_limit() -> TestResult {
    init_tracing();

    let (report, executed, _db) = run_with(chain(), 1, fast_retry(0), |e| e).await?;

    assert!(report.is_success());
    assert_eq!(executed.len(), 3);
    Ok(())
}

#[tokio::test]
async fn runtime_retries_scripted_timeout() -> TestResult {
    init_tracing();

    let (report, executed, _db) = run_with(chain(), 2, fast_retry(1), |e| {
        e.fail(JobId(0), JobFailure::timeout("scripted"))
    })
    .await?;

    assert!(report.is_success());
    assert!(executed.contains(&(JobId(0), 1)));
    assert!(executed.contains(&(JobId(0), 2)));
    assert_eq!(report.job(JobId(0)).unwrap().attempts, 2);
    Ok(())
}

#[tokio::test]
async fn runtime_records_skipped_dependents() -> TestResult {
    init_tracing();

    let (report, executed, db) = run_with(chain(), 2, fast_retry(0), |e| {
        e.fail(JobId(0), JobFailure::logic("scripted"))
    })
    .await?;

    assert_eq!(report.job(JobId(0)).unwrap().state, JobState::Failed);
    assert_eq!(report.job(JobId(1)).unwrap().state, JobState::Skipped);
    assert_eq!(report.job(JobId(2)).unwrap().state, JobState::Succeeded);
    assert!(!executed.iter().any(|(job, _)| *job == JobId(1)));

    // The fake executor writes no rows; the runtime writes the skip.
    let rows = db.query(memodag::Query::all()).fetch()?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].job, JobId(1));
    Ok(())
}
