//! Error types for the retry executor
//!
//! Every way a call can end without a result maps to one variant, so
//! callers can branch on fatal, exhausted, and cancelled outcomes.

use std::error::Error;
use std::fmt;
use std::time::Duration;

use crate::quota::QuotaSnapshot;

/// Errors returned by [`RateLimitManager`](super::RateLimitManager)
///
/// The error type is generic over `E`, the underlying error type from the
/// operation being retried.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The operation failed in a way that retrying cannot fix
    ///
    /// Returned on the first occurrence; no retry is consumed.
    Fatal {
        /// Number of attempts made, including the failing one
        attempts: u32,
        /// The non-retryable error
        source: E,
    },

    /// Every retry was spent on transient failures
    Exhausted {
        /// Number of attempts made before giving up
        attempts: u32,
        /// The error from the final attempt
        source: E,
        /// Time spent waiting between attempts
        total_delay: Duration,
        /// Quota as of the final attempt, when that attempt was rate limited
        quota: Option<QuotaSnapshot>,
    },

    /// The caller cancelled the call or its deadline passed
    Cancelled {
        /// Number of attempts started before cancellation
        attempts: u32,
        /// The last error that occurred, if any
        last_error: Option<E>,
    },
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Fatal { attempts, source } => {
                write!(f, "non-retryable error on attempt {}: {}", attempts, source)
            }
            RetryError::Exhausted {
                attempts,
                source,
                total_delay,
                quota,
            } => {
                write!(
                    f,
                    "retry exhausted after {} attempts ({:.2}s waiting): {}",
                    attempts,
                    total_delay.as_secs_f64(),
                    source
                )?;
                match quota {
                    Some(quota) => write!(f, " [rate limit: {}]", quota),
                    None => Ok(()),
                }
            }
            RetryError::Cancelled {
                attempts,
                last_error,
            } => {
                if let Some(err) = last_error {
                    write!(f, "retry cancelled after {} attempts: {}", attempts, err)
                } else {
                    write!(f, "retry cancelled after {} attempts", attempts)
                }
            }
        }
    }
}

impl<E: Error + 'static> Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RetryError::Fatal { source, .. } => Some(source),
            RetryError::Exhausted { source, .. } => Some(source),
            RetryError::Cancelled {
                last_error: Some(err),
                ..
            } => Some(err),
            RetryError::Cancelled { .. } => None,
        }
    }
}

impl<E> RetryError<E> {
    /// Create a new fatal error
    pub fn fatal(attempts: u32, source: E) -> Self {
        RetryError::Fatal { attempts, source }
    }

    /// Create a new exhausted error
    pub fn exhausted(attempts: u32, source: E, total_delay: Duration) -> Self {
        RetryError::Exhausted {
            attempts,
            source,
            total_delay,
            quota: None,
        }
    }

    /// Attach the quota seen on the final attempt; only `Exhausted` keeps it
    pub fn with_quota(mut self, snapshot: Option<QuotaSnapshot>) -> Self {
        if let RetryError::Exhausted { quota, .. } = &mut self {
            *quota = snapshot;
        }
        self
    }

    /// Create a new cancelled error
    pub fn cancelled(attempts: u32, last_error: Option<E>) -> Self {
        RetryError::Cancelled {
            attempts,
            last_error,
        }
    }

    /// Get the number of attempts made
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Fatal { attempts, .. } => *attempts,
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// Quota at the point a rate limited call gave up
    ///
    /// `Some` only for `Exhausted` errors whose last failure was rate limited.
    pub fn quota(&self) -> Option<&QuotaSnapshot> {
        match self {
            RetryError::Exhausted { quota, .. } => quota.as_ref(),
            _ => None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, RetryError::Fatal { .. })
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }

    /// Get the underlying error, consuming this error
    pub fn into_source(self) -> Option<E> {
        match self {
            RetryError::Fatal { source, .. } => Some(source),
            RetryError::Exhausted { source, .. } => Some(source),
            RetryError::Cancelled { last_error, .. } => last_error,
        }
    }

    /// Get a reference to the underlying error
    pub fn source_ref(&self) -> Option<&E> {
        match self {
            RetryError::Fatal { source, .. } => Some(source),
            RetryError::Exhausted { source, .. } => Some(source),
            RetryError::Cancelled { last_error, .. } => last_error.as_ref(),
        }
    }

    /// Map the error type using a closure
    pub fn map_err<F, E2>(self, f: F) -> RetryError<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            RetryError::Fatal { attempts, source } => RetryError::Fatal {
                attempts,
                source: f(source),
            },
            RetryError::Exhausted {
                attempts,
                source,
                total_delay,
                quota,
            } => RetryError::Exhausted {
                attempts,
                source: f(source),
                total_delay,
                quota,
            },
            RetryError::Cancelled {
                attempts,
                last_error,
            } => RetryError::Cancelled {
                attempts,
                last_error: last_error.map(f),
            },
        }
    }
}
