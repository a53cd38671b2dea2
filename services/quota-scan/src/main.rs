//! Quota scan
//!
//! One-shot maintenance pass over the shared quota state:
//! 1. Track every configured account
//! 2. Clear rate limits whose reset time has passed
//! 3. Optionally check each available account's token (`--validate`)
//! 4. Print a JSON report to stdout
//!
//! Logs go to stderr so the report can be piped.

mod config;
mod scan;

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use keychain::{KeychainStore, TokenValidator};
use quota::QuotaStore;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    // CLI: --config <path> and --validate
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());
    let validate = args.iter().any(|a| a == "--validate");

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        control_dir = %config.quota.control_dir.display(),
        accounts = config.accounts.len(),
        validate,
        "configuration loaded"
    );

    // Lock acquisition blocks, so keep it off the async workers
    let store = QuotaStore::new(&config.quota.control_dir);
    let handles: Vec<String> = config.handles().map(str::to_owned).collect();
    let mut report =
        tokio::task::spawn_blocking(move || scan::scan(&store, &handles, &Local::now()))
            .await
            .context("quota scan task failed")?
            .context("quota scan failed")?;

    if validate {
        let client = reqwest::Client::builder()
            .build()
            .context("failed to build HTTP client")?;
        let validator = TokenValidator::new(client)
            .with_endpoint(config.validation.endpoint.as_str())
            .with_timeout(Duration::from_secs(config.validation.timeout_secs));

        report.tokens = scan::validate_tokens(
            &validator,
            &KeychainStore::new(),
            &config.accounts,
            &report.available,
        )
        .await;
    }

    info!(
        available = report.available.len(),
        limited = report.limited.len(),
        cleared = report.cleared,
        added = report.added,
        "scan complete"
    );

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
