//! Chrome Web Store token CLI
//!
//! Prints a bearer token for the store API on stdout:
//! 1. Loads the OAuth client and authorization code from TOML config
//! 2. Serves the token from the token file when one is stored for the code
//! 3. Otherwise exchanges the code (`get`) or refreshes it (`refresh`)
//! 4. Persists the result so the next run skips the exchange
//!
//! Logs go to stderr as JSON so stdout carries only the token.

mod config;
mod error;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use webstore_auth::{ExchangeClient, FileStorage, TokenManager};

use crate::config::Config;

/// Operation requested on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Get,
    Refresh,
}

/// Parsed command line: `webstore-token [--config PATH] [get|refresh]`
#[derive(Debug, PartialEq, Eq)]
struct Args<'a> {
    config_path: Option<&'a str>,
    command: Command,
}

fn parse_args(args: &[String]) -> Result<Args<'_>> {
    let mut config_path = None;
    let mut command = None;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().context("--config requires a path")?;
                config_path = Some(path.as_str());
            }
            "get" | "refresh" if command.is_some() => {
                anyhow::bail!("only one command may be given, got extra {arg:?}");
            }
            "get" => command = Some(Command::Get),
            "refresh" => command = Some(Command::Refresh),
            other => anyhow::bail!("unknown argument {other:?}; usage: webstore-token [--config PATH] [get|refresh]"),
        }
    }

    Ok(Args {
        config_path,
        command: command.unwrap_or(Command::Get),
    })
}

/// Build the token manager described by the config.
fn build_manager(config: &Config) -> Result<TokenManager> {
    let secret = config
        .oauth
        .client_secret
        .clone()
        .context("client secret was not resolved")?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.oauth.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let exchange = ExchangeClient::new(config.oauth.client_id.clone(), secret)
        .with_endpoint(config.oauth.token_endpoint.clone())
        .with_http_client(http);

    let mut manager = TokenManager::new(config.oauth.code.clone(), exchange);
    if let Some(storage) = &config.storage {
        manager = manager.with_storage(Arc::new(FileStorage::new(storage.path.clone())));
    }
    Ok(manager)
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs on stderr with LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let argv: Vec<String> = std::env::args().collect();
    let args = parse_args(&argv)?;

    let config_path = Config::resolve_path(args.config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        client_id = %config.oauth.client_id,
        token_endpoint = %config.oauth.token_endpoint,
        storage = ?config.storage.as_ref().map(|s| s.path.display().to_string()),
        command = ?args.command,
        "configuration loaded"
    );

    let manager = build_manager(&config)?;

    let result = match args.command {
        Command::Get => manager.get().await,
        Command::Refresh => manager.refresh().await,
    };
    let token = result.map_err(|e| {
        let stage = e.stage();
        anyhow::Error::new(e).context(format!("{:?} failed at {stage} stage", args.command))
    })?;

    info!(state = manager.state().await.label(), "access token ready");
    println!("{token}");
    Ok(())
}
