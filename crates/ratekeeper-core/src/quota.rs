//! Quota tracking from rate limit response metadata
//!
//! APIs modeled on GitHub's REST API advertise their quota on every response
//! through four headers:
//!
//! | Header | Meaning |
//! |---|---|
//! | `X-RateLimit-Limit` | requests allowed in the current window |
//! | `X-RateLimit-Remaining` | requests left in the current window |
//! | `X-RateLimit-Reset` | Unix epoch seconds when the window renews |
//! | `X-RateLimit-Used` | requests consumed in the current window |
//!
//! `RateLimitMetadata` carries those values as raw text; `QuotaState` parses
//! them, tolerating missing or malformed fields, and `SharedQuota` serializes
//! access to one state across concurrent callers.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::Serialize;
use tracing::warn;

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";
pub const HEADER_USED: &str = "x-ratelimit-used";

/// Raw rate limit values reported alongside a response
///
/// Values are kept as text so that parsing problems surface as warnings
/// during [`QuotaState::update`] rather than being lost in an adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitMetadata {
    pub limit: Option<String>,
    pub remaining: Option<String>,
    pub reset: Option<String>,
    pub used: Option<String>,
}

impl RateLimitMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, value: impl ToString) -> Self {
        self.limit = Some(value.to_string());
        self
    }

    pub fn with_remaining(mut self, value: impl ToString) -> Self {
        self.remaining = Some(value.to_string());
        self
    }

    /// Set the reset time as Unix epoch seconds
    pub fn with_reset(mut self, value: impl ToString) -> Self {
        self.reset = Some(value.to_string());
        self
    }

    pub fn with_used(mut self, value: impl ToString) -> Self {
        self.used = Some(value.to_string());
        self
    }

    /// Extract the `X-RateLimit-*` headers from an HTTP header map
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        };

        Self {
            limit: get(HEADER_LIMIT),
            remaining: get(HEADER_REMAINING),
            reset: get(HEADER_RESET),
            used: get(HEADER_USED),
        }
    }

    /// True when no rate limit field was reported at all
    pub fn is_empty(&self) -> bool {
        self.limit.is_none() && self.remaining.is_none() && self.reset.is_none() && self.used.is_none()
    }

    /// True when the metadata reports an exhausted quota (`remaining == 0`)
    pub fn indicates_exhaustion(&self) -> bool {
        self.remaining
            .as_deref()
            .and_then(|v| v.trim().parse::<u64>().ok())
            == Some(0)
    }
}

/// One of the four quota fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotaField {
    Limit,
    Remaining,
    Reset,
    Used,
}

impl QuotaField {
    /// Header name the field is modeled on
    pub fn header(&self) -> &'static str {
        match self {
            QuotaField::Limit => HEADER_LIMIT,
            QuotaField::Remaining => HEADER_REMAINING,
            QuotaField::Reset => HEADER_RESET,
            QuotaField::Used => HEADER_USED,
        }
    }
}

impl fmt::Display for QuotaField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QuotaField::Limit => "limit",
            QuotaField::Remaining => "remaining",
            QuotaField::Reset => "reset",
            QuotaField::Used => "used",
        };
        f.write_str(name)
    }
}

/// Something that went wrong while applying metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaWarning {
    /// The field was not reported
    Missing(QuotaField),
    /// The field was reported but is not a usable number
    NotNumeric { field: QuotaField, value: String },
    /// `remaining` exceeded `limit` and was clamped
    Clamped { reported: u64, limit: u64 },
}

impl fmt::Display for QuotaWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaWarning::Missing(field) => write!(f, "{} not reported", field),
            QuotaWarning::NotNumeric { field, value } => {
                write!(f, "{} is not numeric: {:?}", field, value)
            }
            QuotaWarning::Clamped { reported, limit } => {
                write!(f, "remaining {} exceeds limit {}, clamped", reported, limit)
            }
        }
    }
}

/// Outcome of a single [`QuotaState::update`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaUpdate {
    /// Fields that were parsed and stored
    pub applied: Vec<QuotaField>,
    /// Fields that were skipped or adjusted
    pub warnings: Vec<QuotaWarning>,
}

impl QuotaUpdate {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn applied(&self, field: QuotaField) -> bool {
        self.applied.contains(&field)
    }
}

/// The remote API's advertised quota as last observed
///
/// Starts out unknown (`limit == 0`), which never triggers throttling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaState {
    limit: u64,
    remaining: u64,
    used: u64,
    reset_at: Option<DateTime<Utc>>,
}

impl QuotaState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        self.reset_at
    }

    /// Apply reported metadata
    ///
    /// Missing or non-numeric fields are skipped with a warning; whatever is
    /// present is still applied. A `remaining` above the limit is clamped.
    pub fn update(&mut self, metadata: &RateLimitMetadata) -> QuotaUpdate {
        let mut report = QuotaUpdate::default();

        let limit = parse_field(QuotaField::Limit, metadata.limit.as_deref(), &mut report);
        let remaining = parse_field(QuotaField::Remaining, metadata.remaining.as_deref(), &mut report);
        let used = parse_field(QuotaField::Used, metadata.used.as_deref(), &mut report);
        let reset_at = parse_field::<i64>(QuotaField::Reset, metadata.reset.as_deref(), &mut report)
            .and_then(|epoch| match DateTime::from_timestamp(epoch, 0) {
                Some(at) => Some(at),
                None => {
                    report.warnings.push(QuotaWarning::NotNumeric {
                        field: QuotaField::Reset,
                        value: epoch.to_string(),
                    });
                    None
                }
            });

        if let Some(limit) = limit {
            self.limit = limit;
            report.applied.push(QuotaField::Limit);
        }
        if let Some(remaining) = remaining {
            self.remaining = remaining;
            report.applied.push(QuotaField::Remaining);
        }
        if let Some(reset_at) = reset_at {
            self.reset_at = Some(reset_at);
            report.applied.push(QuotaField::Reset);
        }
        if let Some(used) = used {
            self.used = used;
            report.applied.push(QuotaField::Used);
        }

        // A zero limit that was never reported means "unknown", not "empty".
        let limit_known = self.limit > 0 || limit.is_some();
        if limit_known && self.remaining > self.limit {
            report.warnings.push(QuotaWarning::Clamped {
                reported: self.remaining,
                limit: self.limit,
            });
            self.remaining = self.limit;
        }

        for warning in &report.warnings {
            warn!(warning = %warning, "rate limit metadata");
        }

        report
    }

    /// `remaining / limit`, or `1.0` while the limit is unknown
    pub fn remaining_ratio(&self) -> f64 {
        if self.limit > 0 {
            self.remaining as f64 / self.limit as f64
        } else {
            1.0
        }
    }

    /// Seconds until the quota renews, never negative
    pub fn seconds_until_reset(&self, now: DateTime<Utc>) -> f64 {
        self.reset_at
            .map(|reset| (reset - now).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0)
            .max(0.0)
    }

    /// Whether pre-emptive throttling applies under `threshold`
    pub fn should_throttle(&self, threshold: f64) -> bool {
        self.limit > 0 && self.remaining_ratio() <= threshold
    }

    pub fn snapshot(&self) -> QuotaSnapshot {
        QuotaSnapshot {
            limit: self.limit,
            remaining: self.remaining,
            used: self.used,
            reset_at: self.reset_at,
            remaining_ratio: self.remaining_ratio(),
        }
    }
}

fn parse_field<T: std::str::FromStr>(
    field: QuotaField,
    raw: Option<&str>,
    report: &mut QuotaUpdate,
) -> Option<T> {
    let Some(raw) = raw else {
        report.warnings.push(QuotaWarning::Missing(field));
        return None;
    };
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            report.warnings.push(QuotaWarning::NotNumeric {
                field,
                value: raw.to_string(),
            });
            None
        }
    }
}

/// Point-in-time copy of a quota, for diagnostics and output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaSnapshot {
    pub limit: u64,
    pub remaining: u64,
    pub used: u64,
    pub reset_at: Option<DateTime<Utc>>,
    pub remaining_ratio: f64,
}

impl fmt::Display for QuotaSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} remaining", self.remaining, self.limit)?;
        match self.reset_at {
            Some(at) => write!(f, ", resets at {}", at.to_rfc3339()),
            None => write!(f, ", reset time unknown"),
        }
    }
}

/// Result of a throttle check taken under a single lock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrottleCheck {
    pub engaged: bool,
    pub remaining_ratio: f64,
    pub seconds_until_reset: f64,
}

/// A `QuotaState` shared by every call issued against one API
///
/// Cloning is cheap and yields a handle to the same state. Reads and updates
/// are mutually exclusive; the lock is never held across an `.await`.
#[derive(Debug, Clone, Default)]
pub struct SharedQuota {
    inner: Arc<Mutex<QuotaState>>,
}

impl SharedQuota {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: QuotaState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QuotaState> {
        // QuotaState has no invariants a panicking reader could break.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn update(&self, metadata: &RateLimitMetadata) -> QuotaUpdate {
        self.lock().update(metadata)
    }

    pub fn remaining_ratio(&self) -> f64 {
        self.lock().remaining_ratio()
    }

    pub fn seconds_until_reset(&self, now: DateTime<Utc>) -> f64 {
        self.lock().seconds_until_reset(now)
    }

    pub fn throttle_check(&self, threshold: f64, now: DateTime<Utc>) -> ThrottleCheck {
        let state = self.lock();
        ThrottleCheck {
            engaged: state.should_throttle(threshold),
            remaining_ratio: state.remaining_ratio(),
            seconds_until_reset: state.seconds_until_reset(now),
        }
    }

    pub fn snapshot(&self) -> QuotaSnapshot {
        self.lock().snapshot()
    }

    /// True if both handles point at the same state
    pub fn same_as(&self, other: &SharedQuota) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
