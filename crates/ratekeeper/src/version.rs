//! Version information for the ratekeeper CLI

use serde::{Deserialize, Serialize};

/// Version information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Semantic version
    pub version: String,

    /// Git commit SHA (short)
    pub commit: Option<String>,

    /// Target triple
    pub target: Option<String>,
}

impl VersionInfo {
    /// Create version info for current build
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            commit: option_env!("GIT_SHA").map(String::from),
            target: option_env!("TARGET").map(String::from),
        }
    }

    /// `User-Agent` header value; GitHub rejects requests without one
    pub fn user_agent(&self) -> String {
        format!("ratekeeper/{}", self.version)
    }
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ratekeeper {}", self.version)?;
        if let Some(commit) = &self.commit {
            write!(f, " ({})", commit)?;
        }
        if let Some(target) = &self.target {
            write!(f, " {}", target)?;
        }
        Ok(())
    }
}
