//! Reusable retry policy for transient failures.
//!
//! Factors backoff mechanics out of the dispatch client: callers supply the
//! operation and a predicate deciding which errors are worth retrying.

use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::warn;

use crate::config::{DISPATCH_INITIAL_BACKOFF_MS, DISPATCH_MAX_ATTEMPTS, DISPATCH_MAX_BACKOFF_MS};

/// Bounded exponential backoff with jitter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: usize,
    /// Base delay for the exponential schedule, in milliseconds
    pub initial_backoff_ms: u64,
    /// Ceiling applied to every delay, in milliseconds
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DISPATCH_MAX_ATTEMPTS,
            initial_backoff_ms: DISPATCH_INITIAL_BACKOFF_MS,
            max_backoff_ms: DISPATCH_MAX_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    /// Run `operation`, retrying failures accepted by `retryable`.
    ///
    /// Delays grow exponentially with jitter to avoid thundering herd, capped
    /// at `max_backoff_ms`. Errors rejected by the predicate surface
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts are exhausted, or the first error
    /// the predicate refuses to retry.
    pub async fn run<F, Fut, T, E, P>(&self, operation: F, retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: FnMut(&E) -> bool,
    {
        let strategy = ExponentialBackoff::from_millis(self.initial_backoff_ms)
            .max_delay(Duration::from_millis(self.max_backoff_ms))
            .map(jitter)
            .take(self.max_attempts.saturating_sub(1));

        let result = RetryIf::spawn(strategy, operation, retryable).await;
        if let Err(e) = &result {
            warn!(
                max_attempts = self.max_attempts,
                error = %e,
                "operation failed after retries"
            );
        }
        result
    }
}
