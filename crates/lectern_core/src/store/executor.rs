//! Retry and timing wrapper applied to every data-access call.
//!
//! # Invariants
//! - Retries use a constant delay and stop at `max_retries`.
//! - A closing dataset is never slept on or retried.
//! - Slow calls are reported, never failed.

use super::error::{StoreError, StoreResult};
use log::{debug, warn};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_millis(100),
        }
    }
}

/// Counters observed by one executor since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutorStats {
    pub calls: u64,
    pub retries: u64,
    pub slow_calls: u64,
    pub failures: u64,
}

#[derive(Debug)]
pub struct QueryExecutor {
    dataset: String,
    policy: RetryPolicy,
    slow_threshold: Duration,
    calls: AtomicU64,
    retries: AtomicU64,
    slow_calls: AtomicU64,
    failures: AtomicU64,
}

impl QueryExecutor {
    pub fn new(dataset: impl Into<String>, policy: RetryPolicy, slow_threshold: Duration) -> Self {
        Self {
            dataset: dataset.into(),
            policy,
            slow_threshold,
            calls: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            slow_calls: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            calls: self.calls.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            slow_calls: self.slow_calls.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    /// Runs `operation`, retrying transient failures after a fixed delay.
    ///
    /// `is_closing` is polled before and after every delay; once it reports
    /// `true` the call fails with [`StoreError::DatabaseClosing`].
    ///
    /// # Errors
    /// - `DatabaseClosing` unwrapped, whenever the dataset is closing.
    /// - `QueryFailed` wrapping the last cause otherwise.
    pub async fn run<T, F, Fut>(
        &self,
        label: &'static str,
        is_closing: impl Fn() -> bool,
        mut operation: F,
    ) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let mut retries_remaining = self.policy.max_retries;
        let mut attempts = 0;

        loop {
            attempts += 1;
            let err = match self.timed(label, operation()).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if err.is_closing() {
                self.failures.fetch_add(1, Ordering::Relaxed);
                return Err(StoreError::DatabaseClosing);
            }
            let transient = err.is_transient();
            if !transient || retries_remaining == 0 {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "event=query module=store status=error dataset={} label={} attempts={} error={}",
                    self.dataset, label, attempts, err
                );
                return Err(StoreError::QueryFailed {
                    label,
                    retries_exhausted: transient,
                    attempts,
                    cause: Box::new(err),
                });
            }
            if is_closing() {
                self.failures.fetch_add(1, Ordering::Relaxed);
                return Err(StoreError::DatabaseClosing);
            }

            debug!(
                "event=query_retry module=store status=start dataset={} label={} attempt={} retries_remaining={} error={}",
                self.dataset, label, attempts, retries_remaining, err
            );
            self.retries.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(self.policy.delay).await;
            retries_remaining -= 1;

            if is_closing() {
                self.failures.fetch_add(1, Ordering::Relaxed);
                return Err(StoreError::DatabaseClosing);
            }
        }
    }

    async fn timed<T>(
        &self,
        label: &'static str,
        operation: impl Future<Output = StoreResult<T>>,
    ) -> StoreResult<T> {
        let started_at = Instant::now();
        let result = operation.await;
        let elapsed = started_at.elapsed();

        if elapsed >= self.slow_threshold {
            self.slow_calls.fetch_add(1, Ordering::Relaxed);
            warn!(
                "event=query module=store status=slow dataset={} label={} duration_ms={} ok={}",
                self.dataset,
                label,
                elapsed.as_millis(),
                result.is_ok()
            );
        } else {
            debug!(
                "event=query module=store status=done dataset={} label={} duration_ms={}",
                self.dataset,
                label,
                elapsed.as_millis()
            );
        }
        result
    }
}
