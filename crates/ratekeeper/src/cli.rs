//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Ratekeeper - rate limit aware retry policies
#[derive(Parser, Debug)]
#[command(name = "ratekeeper")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to ratekeeper.yaml policy file
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show version information
    Version(VersionArgs),

    /// Retry policy management
    #[command(subcommand)]
    Policy(PolicyCommands),

    /// Query the API's current rate limit quota
    Quota(QuotaArgs),
}

// Version command
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// Policy commands
#[derive(Subcommand, Debug)]
pub enum PolicyCommands {
    /// Show the effective policy after all layers are applied
    Show(PolicyShowArgs),

    /// Validate the effective policy
    Validate(PolicyValidateArgs),

    /// Write a policy file with the default settings
    Init(PolicyInitArgs),
}

#[derive(Args, Debug)]
pub struct PolicyShowArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct PolicyValidateArgs {
    /// Policy file to validate (default: --config, then discovery)
    #[arg(short, long)]
    pub file: Option<Utf8PathBuf>,
}

#[derive(Args, Debug)]
pub struct PolicyInitArgs {
    /// Output file path
    #[arg(short, long, default_value = "ratekeeper.yaml")]
    pub output: Utf8PathBuf,

    /// Overwrite existing file
    #[arg(short, long)]
    pub force: bool,
}

// Quota command
#[derive(Args, Debug)]
pub struct QuotaArgs {
    /// Base URL of the GitHub-compatible API
    #[arg(long, default_value = "https://api.github.com")]
    pub api_url: String,

    /// Environment variable holding the API token
    #[arg(long, default_value = "GITHUB_TOKEN")]
    pub token_env: String,

    /// Override the policy's max-retries
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Give up after this many seconds, including retry delays
    #[arg(long, default_value = "120")]
    pub timeout: u64,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
