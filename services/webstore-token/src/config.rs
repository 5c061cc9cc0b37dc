//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The client secret is loaded from the WEBSTORE_CLIENT_SECRET env var or
//! client_secret_file, never stored in the TOML directly.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use webstore_auth::{Secret, TOKEN_ENDPOINT};

use crate::error::{Error, Result};

/// Env var holding the OAuth client secret
pub const CLIENT_SECRET_ENV: &str = "WEBSTORE_CLIENT_SECRET";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub oauth: OAuthConfig,
    /// Token file settings. Without this section tokens live only in memory.
    #[serde(default)]
    pub storage: Option<StorageConfig>,
}

/// OAuth client and authorization code
#[derive(Debug, Deserialize)]
pub struct OAuthConfig {
    /// Authorization code pasted from the consent page; also the storage key
    pub code: String,
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret>,
    /// Path to a file containing the client secret (alternative to the env var)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Token file location
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    pub path: PathBuf,
}

fn default_token_endpoint() -> String {
    TOKEN_ENDPOINT.to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from a TOML file, then resolve the client secret.
    ///
    /// Client secret resolution order:
    /// 1. WEBSTORE_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if config.oauth.code.trim().is_empty() {
            return Err(Error::Config("oauth.code must not be empty".into()));
        }

        if config.oauth.client_id.trim().is_empty() {
            return Err(Error::Config("oauth.client_id must not be empty".into()));
        }

        if !config.oauth.token_endpoint.starts_with("http://")
            && !config.oauth.token_endpoint.starts_with("https://")
        {
            return Err(Error::Config(format!(
                "token_endpoint must start with http:// or https://, got: {}",
                config.oauth.token_endpoint
            )));
        }

        if config.oauth.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be greater than 0".into()));
        }

        // Env var takes precedence over file
        if let Ok(secret) = std::env::var(CLIENT_SECRET_ENV) {
            let secret = secret.trim().to_owned();
            if secret.is_empty() {
                return Err(Error::Config(format!("{CLIENT_SECRET_ENV} is set but empty")));
            }
            config.oauth.client_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = config.oauth.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                config.oauth.client_secret = Some(Secret::new(secret));
            }
        }

        if config.oauth.client_secret.is_none() {
            return Err(Error::Config(format!(
                "client secret not configured: set {CLIENT_SECRET_ENV} or oauth.client_secret_file"
            )));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("webstore-token.toml")
    }
}
