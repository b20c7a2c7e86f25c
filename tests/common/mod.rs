#![allow(dead_code)]

use std::time::Duration;

use memodag::{Engine, EngineConfig, RetryPolicy};

pub use memodag_test_utils::{init_tracing, with_timeout, Counter};

/// Retry policy with millisecond delays, so retry tests stay fast.
pub fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(10),
        multiplier: 2.0,
    }
}

/// In-memory engine with fast retries.
pub fn memory_engine() -> Engine {
    Engine::new(EngineConfig::in_memory().with_retry(fast_retry(2))).expect("in-memory engine")
}
