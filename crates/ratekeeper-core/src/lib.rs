//! # ratekeeper-core
//!
//! Core library for Ratekeeper providing:
//! - Validated retry policies (`RateLimitConfig`) and a layered policy loader
//! - Quota tracking from `X-RateLimit-*` response metadata
//! - Exponential backoff with jitter and pre-emptive throttling
//! - A retry executor that classifies failures and supports cancellation
//! - A `reqwest` adapter for wrapping HTTP calls

pub mod config;
pub mod error;
pub mod http;
pub mod quota;
pub mod retry;

pub use config::{ConfigError, ConfigViolation, PolicyLoader, RateLimitConfig, RateLimitSettings};
pub use error::{Error, Result};
pub use quota::{QuotaSnapshot, QuotaState, QuotaUpdate, RateLimitMetadata, SharedQuota};
pub use retry::{RateLimitManager, RetryError};
