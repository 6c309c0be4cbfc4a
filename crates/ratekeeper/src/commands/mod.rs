//! CLI command implementations

pub mod policy;
pub mod quota;
pub mod version;
