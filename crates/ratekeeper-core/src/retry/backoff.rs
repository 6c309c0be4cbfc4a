//! Exponential backoff with optional jitter

use std::time::Duration;

use rand::Rng;

use crate::config::RateLimitConfig;

/// Pre-jitter delay in seconds for a 0-indexed attempt
///
/// `min(initial_delay * backoff_factor^attempt, max_delay)`. Non-decreasing
/// in `attempt` and never above `max_delay`.
pub fn base_delay(attempt: u32, config: &RateLimitConfig) -> f64 {
    let grown = config.initial_delay() * config.backoff_factor().powf(f64::from(attempt));
    // Overflow yields +inf, which the cap absorbs.
    grown.min(config.max_delay())
}

/// Calculate the delay before a retry
///
/// # Arguments
///
/// * `attempt` - The attempt index (0-indexed: the first retry uses 0)
/// * `config` - The validated policy
/// * `rng` - Source of jitter; inject a seeded RNG for reproducible sequences
///
/// With jitter enabled the result lies in `[base, base * (1 + jitter_factor)]`.
///
/// # Example
///
/// ```rust
/// use ratekeeper_core::config::RateLimitConfig;
/// use ratekeeper_core::retry::calculate_delay;
///
/// let config = RateLimitConfig::new(3, 1.0, 10.0, 2.0, 0.1, false, 0.0).unwrap();
/// let mut rng = rand::rng();
///
/// assert_eq!(calculate_delay(0, &config, &mut rng).as_secs_f64(), 1.0);
/// assert_eq!(calculate_delay(1, &config, &mut rng).as_secs_f64(), 2.0);
/// assert_eq!(calculate_delay(4, &config, &mut rng).as_secs_f64(), 10.0);
/// ```
pub fn calculate_delay<R: Rng + ?Sized>(attempt: u32, config: &RateLimitConfig, rng: &mut R) -> Duration {
    let mut delay = base_delay(attempt, config);

    if config.enable_jitter() {
        delay += rng.random_range(0.0..=config.jitter_factor() * delay);
    }

    secs(delay)
}

/// Seconds to `Duration`, saturating at `Duration::MAX`
///
/// Both a large `max_delay` and an absurd reset time can exceed what a
/// `Duration` holds.
pub(crate) fn secs(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}
