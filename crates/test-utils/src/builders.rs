#![allow(dead_code)]

//! Task builders for tests.
//!
//! Each builder counts how often its compute function is invoked, so tests
//! can assert on memoization. They return a `TaskBuilder`, letting a test
//! adjust retries, timeouts or the failure policy before `build()`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use memodag::task::TaskBuilder;
use memodag::{JobFailure, Task, TaskOutput, ValueType};

/// Shared invocation counter.
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// Increment and return the new count.
    pub fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// `double@1(x: Int) -> Int`.
pub fn double_task(calls: &Counter) -> TaskBuilder {
    let calls = calls.clone();
    Task::builder("double", 1)
        .input("x", ValueType::Int)
        .output(ValueType::Int)
        .compute(move |ctx| {
            let calls = calls.clone();
            async move {
                calls.bump();
                Ok(TaskOutput::new(ctx.inputs.int("x")? * 2))
            }
        })
}

/// `sum@1(a: Int, b: Int) -> Int`.
pub fn sum_task(calls: &Counter) -> TaskBuilder {
    let calls = calls.clone();
    Task::builder("sum", 1)
        .input("a", ValueType::Int)
        .input("b", ValueType::Int)
        .output(ValueType::Int)
        .compute(move |ctx| {
            let calls = calls.clone();
            async move {
                calls.bump();
                Ok(TaskOutput::new(ctx.inputs.int("a")? + ctx.inputs.int("b")?))
            }
        })
}

/// `flaky@1() -> Int`: the first `failures` invocations fail with a
/// `Timeout` failure, later ones return 42.
pub fn flaky_task(calls: &Counter, failures: usize) -> TaskBuilder {
    let calls = calls.clone();
    Task::builder("flaky", 1)
        .output(ValueType::Int)
        .compute(move |_ctx| {
            let calls = calls.clone();
            async move {
                let n = calls.bump();
                if n <= failures {
                    return Err(JobFailure::timeout(format!("simulated timeout #{n}")));
                }
                Ok(TaskOutput::new(42))
            }
        })
}

/// `failing@1(x: Int) -> Int`: always fails with a `Logic` failure.
pub fn failing_task(calls: &Counter) -> TaskBuilder {
    let calls = calls.clone();
    Task::builder("failing", 1)
        .input("x", ValueType::Int)
        .output(ValueType::Int)
        .compute(move |ctx| {
            let calls = calls.clone();
            async move {
                calls.bump();
                Err(JobFailure::logic(format!(
                    "refusing input {}",
                    ctx.inputs.int("x")?
                )))
            }
        })
}

/// `slow@1(x: Int) -> Int`: sleeps for `delay`, then echoes `x`.
pub fn slow_task(calls: &Counter, delay: Duration) -> TaskBuilder {
    let calls = calls.clone();
    Task::builder("slow", 1)
        .input("x", ValueType::Int)
        .output(ValueType::Int)
        .compute(move |ctx| {
            let calls = calls.clone();
            async move {
                calls.bump();
                tokio::time::sleep(delay).await;
                Ok(TaskOutput::new(ctx.inputs.int("x")?))
            }
        })
}
