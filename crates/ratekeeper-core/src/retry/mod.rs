//! Rate limit aware retry engine
//!
//! This module wraps calls against a rate limited API (modeled on GitHub's
//! REST API) with exponential backoff, jitter, and pre-emptive throttling
//! driven by the quota the API advertises.
//!
//! # Features
//!
//! - Exponential backoff capped at `max_delay`, with optional jitter from an
//!   injectable RNG
//! - Pre-emptive throttling when the remaining quota falls to the threshold
//! - Failure classification: timeouts, connection errors, 429, exhausted 403,
//!   and 5xx are retried; everything else fails fast
//! - Cancellation by token or deadline during delays and in-flight attempts
//! - Observable retry events via the `RetryObserver` trait, with a built-in
//!   `TracingObserver`
//!
//! # Example
//!
//! ```rust,no_run
//! use ratekeeper_core::config::RateLimitConfig;
//! use ratekeeper_core::quota::RateLimitMetadata;
//! use ratekeeper_core::retry::{RateLimitManager, RetryError};
//!
//! async fn example() -> Result<RateLimitMetadata, RetryError<std::io::Error>> {
//!     let manager = RateLimitManager::new(RateLimitConfig::default());
//!
//!     manager
//!         .execute_with_retry("list-repos", || async {
//!             // Your fallible operation here
//!             Ok(RateLimitMetadata::new().with_limit(5000).with_remaining(4999))
//!         })
//!         .await
//! }
//! ```

mod backoff;
mod cancel;
mod classify;
mod error;
mod executor;
mod observer;

pub use backoff::{base_delay, calculate_delay};
pub use cancel::CancelSignal;
pub use classify::{classify, classify_error, Classification, FailureHint, RateLimited, RetryableFailure};
pub use error::RetryError;
pub use executor::{retry_with_config, RateLimitManager, RateLimitManagerBuilder};
pub use observer::{NoOpObserver, RetryObserver, RetryReason, StatsObserver, TracingObserver};

#[cfg(test)]
mod tests;
