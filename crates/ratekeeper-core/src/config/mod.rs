//! Policy configuration and loading

mod loader;
mod policy;

pub use loader::{LoadedPolicy, PolicyLoader, CONFIG_FILE_NAMES, ENV_PREFIX};
pub use policy::{ConfigError, ConfigViolation, RateLimitConfig, RateLimitSettings};
