//! Error types for ratekeeper-core

use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias using ratekeeper-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for Ratekeeper
///
/// Failures of retried operations are reported through
/// [`RetryError`](crate::retry::RetryError) instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Invalid configuration format or override
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Policy parsed but failed validation
    #[error(transparent)]
    Validation(#[from] ConfigError),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
