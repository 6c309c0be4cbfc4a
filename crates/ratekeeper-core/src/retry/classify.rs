//! Outcome classification
//!
//! Operations describe themselves through two narrow traits:
//! [`RateLimited`] for successful responses and [`RetryableFailure`] for
//! errors. The executor never inspects transport details beyond these.

use std::error::Error;
use std::io;

use crate::quota::RateLimitMetadata;

/// What kind of failure an operation hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureHint {
    /// The request timed out
    Timeout,
    /// The connection could not be established or was dropped
    Connection,
    /// The server answered with a non-success HTTP status
    Status(u16),
    /// Anything else; never retried
    Other,
}

/// A successful response that may carry rate limit metadata
pub trait RateLimited {
    fn rate_limit(&self) -> Option<&RateLimitMetadata>;
}

impl RateLimited for RateLimitMetadata {
    fn rate_limit(&self) -> Option<&RateLimitMetadata> {
        Some(self)
    }
}

impl<T: RateLimited> RateLimited for Box<T> {
    fn rate_limit(&self) -> Option<&RateLimitMetadata> {
        (**self).rate_limit()
    }
}

/// An operation error that can be classified for retry
///
/// # Example
///
/// ```rust
/// use ratekeeper_core::retry::{FailureHint, RetryableFailure};
///
/// #[derive(Debug)]
/// struct ApiError(u16);
///
/// impl std::fmt::Display for ApiError {
///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
///         write!(f, "HTTP {}", self.0)
///     }
/// }
///
/// impl std::error::Error for ApiError {}
///
/// impl RetryableFailure for ApiError {
///     fn failure_hint(&self) -> FailureHint {
///         FailureHint::Status(self.0)
///     }
/// }
/// ```
pub trait RetryableFailure: Error {
    fn failure_hint(&self) -> FailureHint;

    /// Rate limit metadata reported with the failure, if any
    fn failure_metadata(&self) -> Option<&RateLimitMetadata> {
        None
    }
}

impl RetryableFailure for io::Error {
    fn failure_hint(&self) -> FailureHint {
        match self.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => FailureHint::Timeout,
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => FailureHint::Connection,
            _ => FailureHint::Other,
        }
    }
}

/// How the executor treats a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Worth retrying; `rate_limited` failures also wait for the quota reset
    Transient { rate_limited: bool },
    /// Surface immediately
    Fatal,
}

impl Classification {
    pub fn is_transient(&self) -> bool {
        matches!(self, Classification::Transient { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Classification::Transient { rate_limited: true })
    }
}

/// Classify a failure
///
/// | Failure | Classification |
/// |---|---|
/// | timeout, connection error | transient |
/// | 429 | transient, rate limited |
/// | 403 with `remaining == 0` | transient, rate limited |
/// | 5xx | transient |
/// | any other status, 403 without exhaustion metadata, other errors | fatal |
pub fn classify(hint: FailureHint, metadata: Option<&RateLimitMetadata>) -> Classification {
    match hint {
        FailureHint::Timeout | FailureHint::Connection => Classification::Transient {
            rate_limited: false,
        },
        FailureHint::Status(429) => Classification::Transient { rate_limited: true },
        FailureHint::Status(403) if metadata.is_some_and(RateLimitMetadata::indicates_exhaustion) => {
            Classification::Transient { rate_limited: true }
        }
        FailureHint::Status(500..=599) => Classification::Transient {
            rate_limited: false,
        },
        FailureHint::Status(_) | FailureHint::Other => Classification::Fatal,
    }
}

/// Classify an error through its [`RetryableFailure`] implementation
pub fn classify_error<E: RetryableFailure + ?Sized>(error: &E) -> Classification {
    classify(error.failure_hint(), error.failure_metadata())
}
