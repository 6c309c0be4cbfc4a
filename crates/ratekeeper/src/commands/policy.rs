//! Policy command

use anyhow::{bail, Result};
use camino::Utf8Path;
use ratekeeper_core::config::{PolicyLoader, RateLimitConfig};

use crate::cli::{PolicyCommands, PolicyInitArgs, PolicyShowArgs, PolicyValidateArgs};
use crate::output;

pub fn run(cmd: PolicyCommands, config: Option<&Utf8Path>) -> Result<()> {
    match cmd {
        PolicyCommands::Show(args) => show(args, config),
        PolicyCommands::Validate(args) => validate(args, config),
        PolicyCommands::Init(args) => init(args),
    }
}

fn show(args: PolicyShowArgs, config: Option<&Utf8Path>) -> Result<()> {
    let loaded = PolicyLoader::new()?.load_settings(config)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&loaded.settings)?);
    } else {
        println!("# {}", source_label(loaded.source.as_deref()));
        print!("{}", serde_yaml_ng::to_string(&loaded.settings)?);
    }

    if let Err(err) = loaded.settings.validate() {
        output::warning(&err.to_string());
    }

    Ok(())
}

fn validate(args: PolicyValidateArgs, config: Option<&Utf8Path>) -> Result<()> {
    let path = args.file.as_deref().or(config);
    let loaded = PolicyLoader::new()?.load_settings(path)?;
    let source = source_label(loaded.source.as_deref());

    match loaded.settings.validate() {
        Ok(policy) => {
            output::success(&format!("Policy is valid: {}", source));
            print_policy(&policy);
            Ok(())
        }
        Err(err) => {
            for violation in err.violations() {
                output::error(&violation.to_string());
            }
            bail!(
                "{} has {} invalid setting(s)",
                source,
                err.violations().len()
            )
        }
    }
}

fn init(args: PolicyInitArgs) -> Result<()> {
    PolicyLoader::write_default(&args.output, args.force)?;

    output::success(&format!("Created {}", args.output));
    output::info("Edit the file or override single settings with RATEKEEPER_* variables");

    Ok(())
}

fn print_policy(policy: &RateLimitConfig) {
    output::kv("Max retries", &policy.max_retries().to_string());
    output::kv("Max attempts", &policy.max_attempts().to_string());
    output::kv("Initial delay", &format!("{}s", policy.initial_delay()));
    output::kv("Max delay", &format!("{}s", policy.max_delay()));
    output::kv("Backoff factor", &policy.backoff_factor().to_string());
    output::kv(
        "Throttle threshold",
        &format!("{:.1}%", policy.rate_limit_threshold() * 100.0),
    );
    let jitter = if policy.enable_jitter() {
        format!("up to {:.0}%", policy.jitter_factor() * 100.0)
    } else {
        "disabled".to_string()
    };
    output::kv("Jitter", &jitter);
}

fn source_label(source: Option<&Utf8Path>) -> String {
    match source {
        Some(path) => path.to_string(),
        None => "built-in defaults".to_string(),
    }
}
