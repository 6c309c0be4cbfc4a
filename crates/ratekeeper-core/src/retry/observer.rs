//! Retry observation and logging
//!
//! This module provides the `RetryObserver` trait for monitoring calls made
//! through a [`RateLimitManager`](super::RateLimitManager) and a
//! `TracingObserver` implementation that logs using the `tracing` crate.
//!
//! Attempt numbers passed to observers are 0-indexed, matching the attempt
//! index used for backoff.

use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Why the executor is about to wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// Quota is at or below the threshold before the first attempt
    Throttled,
    /// The API rejected the call for exceeding its rate limit
    RateLimited,
    /// A timeout, connection failure, or server error
    Transient,
}

impl fmt::Display for RetryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            RetryReason::Throttled => "throttled",
            RetryReason::RateLimited => "rate_limited",
            RetryReason::Transient => "transient",
        };
        f.write_str(reason)
    }
}

/// Observer trait for retry events
///
/// Implement this trait to receive callbacks during retry execution.
/// This is useful for logging, metrics collection, or debugging.
pub trait RetryObserver: Send + Sync {
    /// Called when an attempt is about to start
    fn on_attempt_start(&self, operation: &str, attempt: u32, max_attempts: u32);

    /// Called when pre-emptive throttling delays the first attempt
    fn on_throttle(&self, operation: &str, delay: Duration, remaining_ratio: f64) {
        let _ = (operation, delay, remaining_ratio);
    }

    /// Called when an attempt failed transiently and a retry is scheduled
    ///
    /// # Arguments
    ///
    /// * `attempt` - The attempt that failed
    /// * `error` - The error that caused the failure
    /// * `delay` - The delay before the next attempt
    /// * `reason` - Whether the wait is driven by the rate limit
    fn on_retry_scheduled(
        &self,
        operation: &str,
        attempt: u32,
        error: &dyn Error,
        delay: Duration,
        reason: RetryReason,
    );

    /// Called when the operation succeeds
    fn on_success(&self, operation: &str, attempt: u32, total_delay: Duration);

    /// Called when all retries are exhausted
    fn on_exhausted(&self, operation: &str, attempts: u32, final_error: &dyn Error);

    /// Called when an attempt fails with a non-retryable error
    fn on_fatal(&self, operation: &str, attempt: u32, error: &dyn Error);

    /// Called when the caller cancels the call or its deadline passes
    fn on_cancelled(&self, operation: &str, attempts: u32) {
        let _ = (operation, attempts);
    }
}

/// A no-op observer that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl RetryObserver for NoOpObserver {
    fn on_attempt_start(&self, _operation: &str, _attempt: u32, _max_attempts: u32) {}

    fn on_retry_scheduled(
        &self,
        _operation: &str,
        _attempt: u32,
        _error: &dyn Error,
        _delay: Duration,
        _reason: RetryReason,
    ) {
    }

    fn on_success(&self, _operation: &str, _attempt: u32, _total_delay: Duration) {}

    fn on_exhausted(&self, _operation: &str, _attempts: u32, _final_error: &dyn Error) {}

    fn on_fatal(&self, _operation: &str, _attempt: u32, _error: &dyn Error) {}
}

/// An observer that logs retry events using the `tracing` crate
///
/// # Log Levels
///
/// - `on_attempt_start`: DEBUG
/// - `on_throttle`: WARN
/// - `on_retry_scheduled`: WARN
/// - `on_success`: INFO (after a retry) or DEBUG (first attempt)
/// - `on_exhausted`: ERROR
/// - `on_fatal`: ERROR
/// - `on_cancelled`: WARN
#[derive(Debug, Clone)]
pub struct TracingObserver {
    /// Name of the API the manager talks to (for log context)
    api: String,
}

impl TracingObserver {
    pub fn new(api: impl Into<String>) -> Self {
        Self { api: api.into() }
    }

    pub fn api(&self) -> &str {
        &self.api
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new("api")
    }
}

impl RetryObserver for TracingObserver {
    fn on_attempt_start(&self, operation: &str, attempt: u32, max_attempts: u32) {
        tracing::debug!(
            api = %self.api,
            operation = %operation,
            attempt = attempt,
            max_attempts = max_attempts,
            "starting attempt"
        );
    }

    fn on_throttle(&self, operation: &str, delay: Duration, remaining_ratio: f64) {
        tracing::warn!(
            api = %self.api,
            operation = %operation,
            attempt = 0,
            delay_ms = delay.as_millis() as u64,
            remaining_ratio = remaining_ratio,
            reason = %RetryReason::Throttled,
            "quota low, throttling before first attempt"
        );
    }

    fn on_retry_scheduled(
        &self,
        operation: &str,
        attempt: u32,
        error: &dyn Error,
        delay: Duration,
        reason: RetryReason,
    ) {
        tracing::warn!(
            api = %self.api,
            operation = %operation,
            attempt = attempt,
            error = %error,
            delay_ms = delay.as_millis() as u64,
            reason = %reason,
            "attempt failed, will retry"
        );
    }

    fn on_success(&self, operation: &str, attempt: u32, total_delay: Duration) {
        if attempt > 0 {
            tracing::info!(
                api = %self.api,
                operation = %operation,
                attempt = attempt,
                total_delay_ms = total_delay.as_millis() as u64,
                "succeeded after retry"
            );
        } else {
            tracing::debug!(
                api = %self.api,
                operation = %operation,
                "succeeded on first attempt"
            );
        }
    }

    fn on_exhausted(&self, operation: &str, attempts: u32, final_error: &dyn Error) {
        tracing::error!(
            api = %self.api,
            operation = %operation,
            attempts = attempts,
            error = %final_error,
            "all retry attempts exhausted"
        );
    }

    fn on_fatal(&self, operation: &str, attempt: u32, error: &dyn Error) {
        tracing::error!(
            api = %self.api,
            operation = %operation,
            attempt = attempt,
            error = %error,
            "non-retryable error"
        );
    }

    fn on_cancelled(&self, operation: &str, attempts: u32) {
        tracing::warn!(
            api = %self.api,
            operation = %operation,
            attempts = attempts,
            "retry cancelled"
        );
    }
}

/// An observer that collects statistics about retry events
///
/// Useful for testing and metrics collection. Scheduled delays are recorded
/// in order, throttle delays included.
#[derive(Debug, Default)]
pub struct StatsObserver {
    /// Attempt start events
    pub attempt_starts: AtomicU32,
    /// Throttle events
    pub throttles: AtomicU32,
    /// Scheduled retry events
    pub retries: AtomicU32,
    /// Success events
    pub successes: AtomicU32,
    /// Exhaustion events
    pub exhaustions: AtomicU32,
    /// Fatal error events
    pub fatals: AtomicU32,
    /// Cancellation events
    pub cancellations: AtomicU32,
    delays: Mutex<Vec<(Duration, RetryReason)>>,
}

impl StatsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempt_starts(&self) -> u32 {
        self.attempt_starts.load(Ordering::SeqCst)
    }

    pub fn throttles(&self) -> u32 {
        self.throttles.load(Ordering::SeqCst)
    }

    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::SeqCst)
    }

    pub fn successes(&self) -> u32 {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn exhaustions(&self) -> u32 {
        self.exhaustions.load(Ordering::SeqCst)
    }

    pub fn fatals(&self) -> u32 {
        self.fatals.load(Ordering::SeqCst)
    }

    pub fn cancellations(&self) -> u32 {
        self.cancellations.load(Ordering::SeqCst)
    }

    /// Every delay announced so far, with its reason
    pub fn delays(&self) -> Vec<(Duration, RetryReason)> {
        self.delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Announced delays in seconds
    pub fn delay_secs(&self) -> Vec<f64> {
        self.delays().iter().map(|(d, _)| d.as_secs_f64()).collect()
    }

    fn record_delay(&self, delay: Duration, reason: RetryReason) {
        self.delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((delay, reason));
    }
}

impl RetryObserver for StatsObserver {
    fn on_attempt_start(&self, _operation: &str, _attempt: u32, _max_attempts: u32) {
        self.attempt_starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_throttle(&self, _operation: &str, delay: Duration, _remaining_ratio: f64) {
        self.throttles.fetch_add(1, Ordering::SeqCst);
        self.record_delay(delay, RetryReason::Throttled);
    }

    fn on_retry_scheduled(
        &self,
        _operation: &str,
        _attempt: u32,
        _error: &dyn Error,
        delay: Duration,
        reason: RetryReason,
    ) {
        self.retries.fetch_add(1, Ordering::SeqCst);
        self.record_delay(delay, reason);
    }

    fn on_success(&self, _operation: &str, _attempt: u32, _total_delay: Duration) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_exhausted(&self, _operation: &str, _attempts: u32, _final_error: &dyn Error) {
        self.exhaustions.fetch_add(1, Ordering::SeqCst);
    }

    fn on_fatal(&self, _operation: &str, _attempt: u32, _error: &dyn Error) {
        self.fatals.fetch_add(1, Ordering::SeqCst);
    }

    fn on_cancelled(&self, _operation: &str, _attempts: u32) {
        self.cancellations.fetch_add(1, Ordering::SeqCst);
    }
}

// Smart pointers and references observe through their target, so one
// `StatsObserver` can be shared between a manager and the code inspecting it.
macro_rules! forward_observer {
    ($($pointer:ty),+ $(,)?) => {$(
        impl<T: RetryObserver + ?Sized> RetryObserver for $pointer {
            fn on_attempt_start(&self, operation: &str, attempt: u32, max_attempts: u32) {
                T::on_attempt_start(self, operation, attempt, max_attempts)
            }

            fn on_throttle(&self, operation: &str, delay: Duration, remaining_ratio: f64) {
                T::on_throttle(self, operation, delay, remaining_ratio)
            }

            fn on_retry_scheduled(
                &self,
                operation: &str,
                attempt: u32,
                error: &dyn Error,
                delay: Duration,
                reason: RetryReason,
            ) {
                T::on_retry_scheduled(self, operation, attempt, error, delay, reason)
            }

            fn on_success(&self, operation: &str, attempt: u32, total_delay: Duration) {
                T::on_success(self, operation, attempt, total_delay)
            }

            fn on_exhausted(&self, operation: &str, attempts: u32, final_error: &dyn Error) {
                T::on_exhausted(self, operation, attempts, final_error)
            }

            fn on_fatal(&self, operation: &str, attempt: u32, error: &dyn Error) {
                T::on_fatal(self, operation, attempt, error)
            }

            fn on_cancelled(&self, operation: &str, attempts: u32) {
                T::on_cancelled(self, operation, attempts)
            }
        }
    )+};
}

forward_observer!(&T, Box<T>, std::sync::Arc<T>);
