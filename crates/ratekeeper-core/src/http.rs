//! `reqwest` adapter for the retry executor
//!
//! Wraps a finished request as an [`HttpResponse`] or [`HttpError`] so it can
//! be passed straight through
//! [`RateLimitManager::execute_with_retry`](crate::retry::RateLimitManager::execute_with_retry).
//!
//! ```rust,no_run
//! use ratekeeper_core::http::HttpResponse;
//! use ratekeeper_core::{RateLimitConfig, RateLimitManager};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = &reqwest::Client::new();
//! let manager = RateLimitManager::new(RateLimitConfig::default());
//!
//! let response = manager
//!     .execute_with_retry("rate-limit", || async move {
//!         HttpResponse::from_reqwest(client.get("https://api.github.com/rate_limit").send().await?).await
//!     })
//!     .await?;
//! println!("{}", response.body);
//! # Ok(())
//! # }
//! ```

use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::quota::RateLimitMetadata;
use crate::retry::{FailureHint, RateLimited, RetryableFailure};

/// A successful (2xx) HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub metadata: RateLimitMetadata,
    pub body: String,
}

impl HttpResponse {
    /// Read a `reqwest` response, turning non-success statuses into errors
    pub async fn from_reqwest(response: reqwest::Response) -> Result<Self, HttpError> {
        let status = response.status().as_u16();
        let metadata = RateLimitMetadata::from_headers(response.headers());
        let body = response.text().await?;
        Self::from_parts(status, metadata, body)
    }

    /// Build from an already-read status, header metadata, and body
    pub fn from_parts(
        status: u16,
        metadata: RateLimitMetadata,
        body: String,
    ) -> Result<Self, HttpError> {
        if (200..300).contains(&status) {
            Ok(Self {
                status,
                metadata,
                body,
            })
        } else {
            Err(HttpError::Status {
                status,
                metadata,
                body,
            })
        }
    }

    /// Shorthand for [`from_parts`](Self::from_parts) with a raw header map
    pub fn from_headers(status: u16, headers: &HeaderMap, body: String) -> Result<Self, HttpError> {
        Self::from_parts(status, RateLimitMetadata::from_headers(headers), body)
    }

    /// Deserialize the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_str(&self.body).map_err(HttpError::from)
    }
}

impl RateLimited for HttpResponse {
    fn rate_limit(&self) -> Option<&RateLimitMetadata> {
        if self.metadata.is_empty() {
            None
        } else {
            Some(&self.metadata)
        }
    }
}

/// Failure of a single HTTP attempt
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    #[error("connection failed: {0}")]
    Connection(#[source] reqwest::Error),

    #[error("HTTP {status}: {}", summarize(body))]
    Status {
        status: u16,
        metadata: RateLimitMetadata,
        body: String,
    },

    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),
}

impl HttpError {
    /// HTTP status, if the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HttpError::Timeout(err)
        } else if err.is_connect() {
            HttpError::Connection(err)
        } else {
            HttpError::Request(err)
        }
    }
}

impl RetryableFailure for HttpError {
    fn failure_hint(&self) -> FailureHint {
        match self {
            HttpError::Timeout(_) => FailureHint::Timeout,
            HttpError::Connection(_) => FailureHint::Connection,
            HttpError::Status { status, .. } => FailureHint::Status(*status),
            HttpError::Request(_) | HttpError::Json(_) => FailureHint::Other,
        }
    }

    fn failure_metadata(&self) -> Option<&RateLimitMetadata> {
        match self {
            HttpError::Status { metadata, .. } if !metadata.is_empty() => Some(metadata),
            _ => None,
        }
    }
}

/// First line of an error body, shortened for display
fn summarize(body: &str) -> String {
    const MAX: usize = 200;
    let line = body.lines().next().unwrap_or("").trim();
    if line.chars().count() > MAX {
        let cut: String = line.chars().take(MAX).collect();
        format!("{cut}...")
    } else {
        line.to_string()
    }
}
