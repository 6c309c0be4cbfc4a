//! Ratekeeper CLI - rate limit policies and API quota
//!
//! This is the main entry point for the ratekeeper command-line interface.

mod cli;
mod commands;
mod output;
mod version;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Version(args) => commands::version::run(args),
        Commands::Policy(cmd) => commands::policy::run(cmd, cli.config.as_deref()),
        Commands::Quota(args) => commands::quota::run(args, cli.config.as_deref()).await,
    }
}

/// Initialize tracing with appropriate verbosity
///
/// `RUST_LOG` wins over the flags when set.
fn init_tracing(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            // Retry and throttle events are logged at warn, so they show by default
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
