//! Rate limit policy types
//!
//! `RateLimitSettings` is the raw, deserializable form of a policy as it
//! appears in `ratekeeper.yaml`. `RateLimitConfig` is the validated form the
//! retry executor runs with; the only way to obtain one is through
//! validation.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single field that failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigViolation {
    /// Name of the offending field (kebab-case, as written in config files)
    pub field: &'static str,
    /// What is wrong with the value
    pub message: String,
}

impl fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Invalid rate limit policy
///
/// Carries every violated field, not only the first one found.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid rate limit policy: {}", join_violations(.violations))]
pub struct ConfigError {
    violations: Vec<ConfigViolation>,
}

fn join_violations(violations: &[ConfigViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ConfigError {
    /// All violated fields, in declaration order
    pub fn violations(&self) -> &[ConfigViolation] {
        &self.violations
    }

    /// Names of the violated fields
    pub fn fields(&self) -> Vec<&'static str> {
        self.violations.iter().map(|v| v.field).collect()
    }

    /// Check whether a given field was rejected
    pub fn has_field(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

/// Raw rate limit policy as read from configuration
///
/// Every field has a default, so a partial YAML document is valid input.
/// `max_retries` is signed so that a negative value reaches validation
/// instead of failing inside the YAML parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RateLimitSettings {
    /// Number of retries after the initial attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: i64,

    /// Delay before the first retry, in seconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay: f64,

    /// Upper bound on any computed delay, in seconds
    #[serde(default = "default_max_delay")]
    pub max_delay: f64,

    /// Multiplicative growth of the delay per attempt
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Remaining-quota ratio at or below which calls are throttled up front
    #[serde(default = "default_rate_limit_threshold")]
    pub rate_limit_threshold: f64,

    /// Add random jitter to computed delays
    #[serde(default = "default_enable_jitter")]
    pub enable_jitter: bool,

    /// Maximum jitter as a fraction of the base delay
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_factor: default_backoff_factor(),
            rate_limit_threshold: default_rate_limit_threshold(),
            enable_jitter: default_enable_jitter(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

fn default_max_retries() -> i64 {
    5
}
fn default_initial_delay() -> f64 {
    1.0
}
fn default_max_delay() -> f64 {
    3600.0
}
fn default_backoff_factor() -> f64 {
    2.0
}
fn default_rate_limit_threshold() -> f64 {
    0.1
}
fn default_enable_jitter() -> bool {
    true
}
fn default_jitter_factor() -> f64 {
    0.1
}

impl RateLimitSettings {
    /// Validate these settings into an immutable `RateLimitConfig`
    pub fn validate(&self) -> Result<RateLimitConfig, ConfigError> {
        let mut violations = Vec::new();
        let mut reject = |field: &'static str, message: String| {
            violations.push(ConfigViolation { field, message });
        };

        let max_retries = match u32::try_from(self.max_retries) {
            Ok(n) => n,
            Err(_) if self.max_retries < 0 => {
                reject(
                    "max-retries",
                    format!("must be >= 0 (got {})", self.max_retries),
                );
                0
            }
            Err(_) => {
                reject(
                    "max-retries",
                    format!("must be <= {} (got {})", u32::MAX, self.max_retries),
                );
                0
            }
        };

        // Written as negated comparisons so NaN is rejected too.
        if !(self.initial_delay > 0.0 && self.initial_delay.is_finite()) {
            reject(
                "initial-delay",
                format!("must be a positive number of seconds (got {})", self.initial_delay),
            );
        }
        if !(self.max_delay >= self.initial_delay && self.max_delay.is_finite()) {
            reject(
                "max-delay",
                format!(
                    "must be finite and >= initial-delay {} (got {})",
                    self.initial_delay, self.max_delay
                ),
            );
        }
        if !(self.backoff_factor > 1.0 && self.backoff_factor.is_finite()) {
            reject(
                "backoff-factor",
                format!("must be greater than 1 (got {})", self.backoff_factor),
            );
        }
        if !(0.0..=1.0).contains(&self.rate_limit_threshold) {
            reject(
                "rate-limit-threshold",
                format!("must be within [0, 1] (got {})", self.rate_limit_threshold),
            );
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            reject(
                "jitter-factor",
                format!("must be within [0, 1] (got {})", self.jitter_factor),
            );
        }

        if !violations.is_empty() {
            return Err(ConfigError { violations });
        }

        Ok(RateLimitConfig {
            max_retries,
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            backoff_factor: self.backoff_factor,
            rate_limit_threshold: self.rate_limit_threshold,
            enable_jitter: self.enable_jitter,
            jitter_factor: self.jitter_factor,
        })
    }
}

/// Validated, immutable rate limit policy
///
/// Construct through [`RateLimitSettings::validate`], `TryFrom`, or
/// [`RateLimitConfig::new`].
///
/// # Example
///
/// ```rust
/// use ratekeeper_core::config::{RateLimitConfig, RateLimitSettings};
///
/// let config = RateLimitConfig::try_from(RateLimitSettings {
///     max_retries: 2,
///     enable_jitter: false,
///     ..RateLimitSettings::default()
/// })
/// .unwrap();
///
/// assert_eq!(config.max_retries(), 2);
/// assert_eq!(config.max_attempts(), 3);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    max_retries: u32,
    initial_delay: f64,
    max_delay: f64,
    backoff_factor: f64,
    rate_limit_threshold: f64,
    enable_jitter: bool,
    jitter_factor: f64,
}

impl RateLimitConfig {
    /// Build and validate a policy from its seven parameters
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        max_retries: i64,
        initial_delay: f64,
        max_delay: f64,
        backoff_factor: f64,
        rate_limit_threshold: f64,
        enable_jitter: bool,
        jitter_factor: f64,
    ) -> Result<Self, ConfigError> {
        RateLimitSettings {
            max_retries,
            initial_delay,
            max_delay,
            backoff_factor,
            rate_limit_threshold,
            enable_jitter,
            jitter_factor,
        }
        .validate()
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts a call may make: the initial one plus every retry
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Initial delay in seconds
    pub fn initial_delay(&self) -> f64 {
        self.initial_delay
    }

    /// Delay cap in seconds
    pub fn max_delay(&self) -> f64 {
        self.max_delay
    }

    /// Delay cap as a `Duration`, saturating at `Duration::MAX`
    pub fn max_delay_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_delay).unwrap_or(Duration::MAX)
    }

    pub fn backoff_factor(&self) -> f64 {
        self.backoff_factor
    }

    pub fn rate_limit_threshold(&self) -> f64 {
        self.rate_limit_threshold
    }

    pub fn enable_jitter(&self) -> bool {
        self.enable_jitter
    }

    pub fn jitter_factor(&self) -> f64 {
        self.jitter_factor
    }

    /// Convert back to raw settings, e.g. for writing a config file
    pub fn to_settings(&self) -> RateLimitSettings {
        RateLimitSettings {
            max_retries: i64::from(self.max_retries),
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            backoff_factor: self.backoff_factor,
            rate_limit_threshold: self.rate_limit_threshold,
            enable_jitter: self.enable_jitter,
            jitter_factor: self.jitter_factor,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let defaults = RateLimitSettings::default();
        Self {
            max_retries: defaults.max_retries as u32,
            initial_delay: defaults.initial_delay,
            max_delay: defaults.max_delay,
            backoff_factor: defaults.backoff_factor,
            rate_limit_threshold: defaults.rate_limit_threshold,
            enable_jitter: defaults.enable_jitter,
            jitter_factor: defaults.jitter_factor,
        }
    }
}

impl TryFrom<RateLimitSettings> for RateLimitConfig {
    type Error = ConfigError;

    fn try_from(settings: RateLimitSettings) -> Result<Self, Self::Error> {
        settings.validate()
    }
}

impl TryFrom<&RateLimitSettings> for RateLimitConfig {
    type Error = ConfigError;

    fn try_from(settings: &RateLimitSettings) -> Result<Self, Self::Error> {
        settings.validate()
    }
}
