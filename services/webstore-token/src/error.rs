//! CLI configuration errors

use thiserror::Error;

/// Errors raised while loading configuration. Token errors come from
/// `webstore_auth::Error` and are reported by `main` with their stage.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using the CLI Error
pub type Result<T> = std::result::Result<T, Error>;
