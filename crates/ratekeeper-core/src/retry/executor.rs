//! Rate limit aware retry execution
//!
//! Each call runs the same sequence: a pre-emptive throttle check against
//! the shared quota, then attempts until success, a fatal failure, an
//! exhausted retry budget, or cancellation. Quota metadata from every
//! completed attempt is folded into the shared state.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::RateLimitConfig;
use crate::quota::{QuotaSnapshot, SharedQuota};

use super::backoff::{calculate_delay, secs};
use super::cancel::{sleep_or_cancel, CancelSignal};
use super::classify::{classify_error, Classification, RateLimited, RetryableFailure};
use super::error::RetryError;
use super::observer::{RetryObserver, RetryReason, TracingObserver};

/// Execute a single named operation under `config`
///
/// Convenience wrapper for one-off calls; it builds a fresh manager, so the
/// quota it learns is discarded afterwards. Long-lived callers should keep a
/// [`RateLimitManager`] instead.
pub async fn retry_with_config<F, Fut, T, E>(
    config: &RateLimitConfig,
    name: &str,
    op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    T: RateLimited,
    E: RetryableFailure,
{
    RateLimitManager::new(config.clone())
        .execute_with_retry(name, op)
        .await
}

/// Builder for configuring a `RateLimitManager`
///
/// # Example
///
/// ```rust
/// use rand::SeedableRng;
/// use ratekeeper_core::config::RateLimitConfig;
/// use ratekeeper_core::retry::{RateLimitManager, StatsObserver};
///
/// let manager = RateLimitManager::builder()
///     .with_config(RateLimitConfig::default())
///     .with_observer(StatsObserver::new())
///     .with_rng(rand::rngs::StdRng::seed_from_u64(7))
///     .build();
///
/// assert_eq!(manager.config().max_retries(), 5);
/// ```
pub struct RateLimitManagerBuilder<O = TracingObserver> {
    config: RateLimitConfig,
    quota: Option<SharedQuota>,
    observer: O,
    rng: Option<StdRng>,
}

impl Default for RateLimitManagerBuilder<TracingObserver> {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitManagerBuilder<TracingObserver> {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            config: RateLimitConfig::default(),
            quota: None,
            observer: TracingObserver::default(),
            rng: None,
        }
    }
}

impl<O> RateLimitManagerBuilder<O> {
    pub fn with_config(mut self, config: RateLimitConfig) -> Self {
        self.config = config;
        self
    }

    /// Share quota state with other managers targeting the same API
    pub fn with_quota(mut self, quota: SharedQuota) -> Self {
        self.quota = Some(quota);
        self
    }

    /// Set the observer
    ///
    /// The observer receives callbacks during retry execution.
    pub fn with_observer<O2>(self, observer: O2) -> RateLimitManagerBuilder<O2> {
        RateLimitManagerBuilder {
            config: self.config,
            quota: self.quota,
            observer,
            rng: self.rng,
        }
    }

    /// Set the jitter source; seed it for reproducible delays
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Some(rng);
        self
    }

    pub fn build(self) -> RateLimitManager<O> {
        RateLimitManager {
            config: self.config,
            quota: self.quota.unwrap_or_default(),
            observer: self.observer,
            rng: Mutex::new(self.rng.unwrap_or_else(StdRng::from_os_rng)),
        }
    }
}

/// Retry orchestrator for calls against one rate limited API
///
/// Safe to share between tasks (`Arc<RateLimitManager>`); every call reads
/// and updates the same quota state.
pub struct RateLimitManager<O = TracingObserver> {
    config: RateLimitConfig,
    quota: SharedQuota,
    observer: O,
    rng: Mutex<StdRng>,
}

impl RateLimitManager<TracingObserver> {
    /// Create a manager that logs through `tracing`
    pub fn new(config: RateLimitConfig) -> Self {
        RateLimitManagerBuilder::new().with_config(config).build()
    }

    pub fn builder() -> RateLimitManagerBuilder<TracingObserver> {
        RateLimitManagerBuilder::new()
    }
}

impl<O> RateLimitManager<O> {
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Current view of the API's quota
    pub fn quota(&self) -> QuotaSnapshot {
        self.quota.snapshot()
    }

    /// Handle to the shared quota state
    pub fn shared_quota(&self) -> SharedQuota {
        self.quota.clone()
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        calculate_delay(attempt, &self.config, &mut *rng)
    }
}

impl<O: RetryObserver> RateLimitManager<O> {
    /// Execute an operation with retry logic
    ///
    /// # Arguments
    ///
    /// * `name` - A label for the operation, used only for logging
    /// * `op` - A closure that returns a future representing one attempt
    ///
    /// # Returns
    ///
    /// The result of the operation, or a `RetryError` describing why the
    /// call gave up.
    pub async fn execute_with_retry<F, Fut, T, E>(&self, name: &str, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: RateLimited,
        E: RetryableFailure,
    {
        self.execute_with_cancel(name, &CancelSignal::new(), op).await
    }

    /// Execute an operation with retry logic, abandoning it when `cancel` fires
    ///
    /// Cancellation interrupts a pending delay or an in-flight attempt; no
    /// further attempt starts once it is observed.
    pub async fn execute_with_cancel<F, Fut, T, E>(
        &self,
        name: &str,
        cancel: &CancelSignal,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: RateLimited,
        E: RetryableFailure,
    {
        let max_attempts = self.config.max_attempts();
        let mut total_delay = Duration::ZERO;
        let mut last_error: Option<E> = None;

        let check = self
            .quota
            .throttle_check(self.config.rate_limit_threshold(), Utc::now());
        if check.engaged {
            let wait = self.backoff(0).max(secs(check.seconds_until_reset));
            self.observer.on_throttle(name, wait, check.remaining_ratio);

            if !sleep_or_cancel(wait, cancel).await {
                self.observer.on_cancelled(name, 0);
                return Err(RetryError::cancelled(0, None));
            }
            total_delay = total_delay.saturating_add(wait);
        }

        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                self.observer.on_cancelled(name, attempt);
                return Err(RetryError::cancelled(attempt, last_error));
            }

            self.observer.on_attempt_start(name, attempt, max_attempts);

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                result = op() => Some(result),
            };
            let attempts = attempt + 1;
            let Some(outcome) = outcome else {
                self.observer.on_cancelled(name, attempts);
                return Err(RetryError::cancelled(attempts, last_error));
            };

            let err = match outcome {
                Ok(value) => {
                    if let Some(metadata) = value.rate_limit() {
                        self.quota.update(metadata);
                    }
                    self.observer.on_success(name, attempt, total_delay);
                    return Ok(value);
                }
                Err(err) => err,
            };

            if let Some(metadata) = err.failure_metadata() {
                self.quota.update(metadata);
            }

            let rate_limited = match classify_error(&err) {
                Classification::Fatal => {
                    self.observer.on_fatal(name, attempt, &err);
                    return Err(RetryError::fatal(attempts, err));
                }
                Classification::Transient { rate_limited } => rate_limited,
            };

            if attempt >= self.config.max_retries() {
                self.observer.on_exhausted(name, attempts, &err);
                let quota = rate_limited.then(|| self.quota.snapshot());
                return Err(RetryError::exhausted(attempts, err, total_delay).with_quota(quota));
            }

            let mut delay = self.backoff(attempt);
            let reason = if rate_limited {
                delay = delay.max(secs(self.quota.seconds_until_reset(Utc::now())));
                RetryReason::RateLimited
            } else {
                RetryReason::Transient
            };
            self.observer
                .on_retry_scheduled(name, attempt, &err, delay, reason);

            if !sleep_or_cancel(delay, cancel).await {
                self.observer.on_cancelled(name, attempts);
                return Err(RetryError::cancelled(attempts, Some(err)));
            }
            total_delay = total_delay.saturating_add(delay);
            last_error = Some(err);
            attempt += 1;
        }
    }
}
