//! Layered policy loading
//!
//! Loads a rate limit policy with the following precedence (low to high):
//! 1. Built-in defaults
//! 2. Policy file (explicit path, else `./ratekeeper.yaml`, else `~/.ratekeeper/ratekeeper.yaml`)
//! 3. Environment variables (`RATEKEEPER_*` prefix)
//! 4. CLI flags (handled by caller)

use std::env;
use std::fs;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use super::policy::{RateLimitConfig, RateLimitSettings};
use crate::error::{Error, Result};

/// Policy file names to search for
pub const CONFIG_FILE_NAMES: &[&str] = &["ratekeeper.yaml", "ratekeeper.yml"];

/// Prefix for environment variable overrides
pub const ENV_PREFIX: &str = "RATEKEEPER_";

/// Settings together with the file they were read from, if any
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPolicy {
    pub settings: RateLimitSettings,
    pub source: Option<Utf8PathBuf>,
}

/// Policy loader with file discovery and environment overrides
#[derive(Debug, Clone)]
pub struct PolicyLoader {
    working_dir: Utf8PathBuf,
    config_dir: Option<Utf8PathBuf>,
}

impl PolicyLoader {
    /// Create a loader rooted at the current directory and `~/.ratekeeper`
    pub fn new() -> Result<Self> {
        let working_dir = env::current_dir()?;
        let working_dir = Utf8PathBuf::from_path_buf(working_dir)
            .map_err(|p| Error::invalid_config(format!("Non UTF-8 working directory: {}", p.display())))?;

        let config_dir = dirs::home_dir()
            .and_then(|home| Utf8PathBuf::from_path_buf(home).ok())
            .map(|home| home.join(".ratekeeper"));

        Ok(Self {
            working_dir,
            config_dir,
        })
    }

    /// Create a loader with explicit search directories
    pub fn with_dirs(working_dir: Utf8PathBuf, config_dir: Option<Utf8PathBuf>) -> Self {
        Self {
            working_dir,
            config_dir,
        }
    }

    /// Global config directory, if a home directory could be determined
    pub fn config_dir(&self) -> Option<&Utf8Path> {
        self.config_dir.as_deref()
    }

    /// Search the working directory, then the global config directory
    pub fn find_config(&self) -> Option<Utf8PathBuf> {
        std::iter::once(self.working_dir.as_path())
            .chain(self.config_dir.as_deref())
            .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
            .find(|candidate| candidate.is_file())
    }

    /// Load raw settings from all layers without validating them
    pub fn load_settings(&self, path: Option<&Utf8Path>) -> Result<LoadedPolicy> {
        let source = match path {
            Some(p) if !p.is_file() => return Err(Error::config_not_found(p.as_str())),
            Some(p) => Some(p.to_owned()),
            None => self.find_config(),
        };

        let mut settings = match &source {
            Some(p) => {
                debug!(path = %p, "loading rate limit policy file");
                Self::load_yaml_file(p)?
            }
            None => {
                debug!("no policy file found, using built-in defaults");
                RateLimitSettings::default()
            }
        };

        apply_env_overrides(&mut settings)?;

        Ok(LoadedPolicy { settings, source })
    }

    /// Load and validate the effective policy
    pub fn load(&self, path: Option<&Utf8Path>) -> Result<RateLimitConfig> {
        let loaded = self.load_settings(path)?;
        Ok(loaded.settings.validate()?)
    }

    /// Write the default policy as YAML
    ///
    /// Refuses to overwrite an existing file unless `force` is set.
    pub fn write_default(path: &Utf8Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            return Err(Error::invalid_config(format!(
                "{} already exists (use --force to overwrite)",
                path
            )));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let yaml = serde_yaml_ng::to_string(&RateLimitSettings::default())?;
        fs::write(path, yaml)?;
        Ok(())
    }

    fn load_yaml_file(path: &Utf8Path) -> Result<RateLimitSettings> {
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(RateLimitSettings::default());
        }
        serde_yaml_ng::from_str(&content)
            .map_err(|e| Error::invalid_config(format!("Failed to parse {}: {}", path, e)))
    }
}

/// Apply `RATEKEEPER_*` environment variable overrides
fn apply_env_overrides(settings: &mut RateLimitSettings) -> Result<()> {
    if let Some(v) = env_override("MAX_RETRIES")? {
        settings.max_retries = v;
    }
    if let Some(v) = env_override("INITIAL_DELAY")? {
        settings.initial_delay = v;
    }
    if let Some(v) = env_override("MAX_DELAY")? {
        settings.max_delay = v;
    }
    if let Some(v) = env_override("BACKOFF_FACTOR")? {
        settings.backoff_factor = v;
    }
    if let Some(v) = env_override("RATE_LIMIT_THRESHOLD")? {
        settings.rate_limit_threshold = v;
    }
    if let Some(v) = env_override("ENABLE_JITTER")? {
        settings.enable_jitter = v;
    }
    if let Some(v) = env_override("JITTER_FACTOR")? {
        settings.jitter_factor = v;
    }
    Ok(())
}

fn env_override<T: FromStr>(suffix: &str) -> Result<Option<T>> {
    let name = format!("{}{}", ENV_PREFIX, suffix);
    match env::var(&name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::invalid_config(format!("{} has an invalid value: {:?}", name, raw))),
        Err(_) => Ok(None),
    }
}
