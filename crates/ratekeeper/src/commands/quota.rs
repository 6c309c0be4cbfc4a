//! Quota command
//!
//! Fetches `GET /rate_limit` through a `RateLimitManager`, so the request
//! itself is retried and throttled under the effective policy.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use camino::Utf8Path;
use chrono::DateTime;
use ratekeeper_core::config::PolicyLoader;
use ratekeeper_core::http::HttpResponse;
use ratekeeper_core::retry::{CancelSignal, RateLimitManager, TracingObserver};
use ratekeeper_core::{QuotaSnapshot, RateLimitConfig};
use serde::{Deserialize, Serialize};

use crate::cli::QuotaArgs;
use crate::output;
use crate::version::VersionInfo;

/// One bucket of the `/rate_limit` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceQuota {
    pub limit: u64,
    pub remaining: u64,
    #[serde(default)]
    pub used: u64,
    pub reset: i64,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    #[serde(default)]
    resources: BTreeMap<String, ResourceQuota>,
}

#[derive(Debug, Serialize)]
struct QuotaReport<'a> {
    api_url: &'a str,
    quota: QuotaSnapshot,
    resources: BTreeMap<String, ResourceQuota>,
}

pub async fn run(args: QuotaArgs, config: Option<&Utf8Path>) -> Result<()> {
    let policy = load_policy(config, args.max_retries)?;
    let threshold = policy.rate_limit_threshold();
    let url = rate_limit_url(&args.api_url);

    let client = reqwest::Client::builder()
        .user_agent(VersionInfo::current().user_agent())
        .timeout(Duration::from_secs(30))
        .build()?;
    let token = std::env::var(&args.token_env).ok().filter(|t| !t.is_empty());
    if token.is_none() {
        tracing::debug!(token_env = %args.token_env, "no token set, using the unauthenticated quota");
    }

    let manager = RateLimitManager::builder()
        .with_config(policy)
        .with_observer(TracingObserver::new(args.api_url.clone()))
        .build();

    let cancel = CancelSignal::new().with_timeout(Duration::from_secs(args.timeout));
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let client = &client;
    let token = token.as_deref();
    let url = url.as_str();
    let response = manager
        .execute_with_cancel("rate-limit", &cancel, || {
            let mut request = client.get(url).header("Accept", "application/vnd.github+json");
            if let Some(token) = token {
                request = request.bearer_auth(token);
            }
            async move { HttpResponse::from_reqwest(request.send().await?).await }
        })
        .await
        .with_context(|| format!("failed to query {}", url))?;

    let body: RateLimitBody = response.json()?;
    let report = QuotaReport {
        api_url: &args.api_url,
        quota: manager.quota(),
        resources: body.resources,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, threshold);
    }

    Ok(())
}

/// Effective policy with the CLI layer applied on top
fn load_policy(config: Option<&Utf8Path>, max_retries: Option<u32>) -> Result<RateLimitConfig> {
    let mut settings = PolicyLoader::new()?.load_settings(config)?.settings;
    if let Some(max_retries) = max_retries {
        settings.max_retries = i64::from(max_retries);
    }
    Ok(settings.validate()?)
}

fn rate_limit_url(api_url: &str) -> String {
    format!("{}/rate_limit", api_url.trim_end_matches('/'))
}

fn print_report(report: &QuotaReport<'_>, threshold: f64) {
    let quota = &report.quota;

    output::header(&format!("Quota for {}", report.api_url));
    output::kv("Limit", &quota.limit.to_string());
    output::kv("Remaining", &quota.remaining.to_string());
    output::kv("Used", &quota.used.to_string());
    output::kv("Remaining ratio", &output::ratio(quota.remaining_ratio, threshold));
    output::kv(
        "Resets at",
        &quota
            .reset_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string()),
    );

    if quota.limit > 0 && quota.remaining_ratio <= threshold {
        output::warning("Quota is at or below the throttle threshold; calls will be delayed");
    }

    if !report.resources.is_empty() {
        output::header("Resources");
        for (name, resource) in &report.resources {
            output::kv(name, &describe_resource(resource));
        }
    }
}

fn describe_resource(resource: &ResourceQuota) -> String {
    let reset = DateTime::from_timestamp(resource.reset, 0)
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| resource.reset.to_string());
    format!(
        "{}/{} remaining, resets at {}",
        resource.remaining, resource.limit, reset
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_rate_limit_url() {
        assert_eq!(
            rate_limit_url("https://api.github.com"),
            "https://api.github.com/rate_limit"
        );
        assert_eq!(
            rate_limit_url("https://ghe.example.com/api/v3/"),
            "https://ghe.example.com/api/v3/rate_limit"
        );
    }

    #[test]
    fn test_parse_rate_limit_body() {
        let json = r#"{
            "resources": {
                "core": {"limit": 5000, "used": 1, "remaining": 4999, "reset": 1700000000},
                "search": {"limit": 30, "used": 12, "remaining": 18, "reset": 1700000060}
            },
            "rate": {"limit": 5000, "used": 1, "remaining": 4999, "reset": 1700000000}
        }"#;

        let body: RateLimitBody = serde_json::from_str(json).unwrap();

        assert_eq!(body.resources.len(), 2);
        assert_eq!(body.resources["search"].remaining, 18);
        assert_eq!(
            describe_resource(&body.resources["core"]),
            "4999/5000 remaining, resets at 2023-11-14T22:13:20+00:00"
        );
    }

    #[test]
    fn test_cli_max_retries_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("ratekeeper.yaml")).unwrap();
        std::fs::write(&path, "max-retries: 7\nenable-jitter: false\n").unwrap();

        assert_eq!(load_policy(Some(&path), None).unwrap().max_retries(), 7);

        let policy = load_policy(Some(&path), Some(1)).unwrap();
        assert_eq!(policy.max_retries(), 1);
        assert!(!policy.enable_jitter());
    }
}
