//! Error types for token exchange, caching and storage

/// Errors from token manager operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("no refresh token available for this authorization code")]
    MissingRefreshToken,

    #[error("token storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Stage that failed, for logging and user-facing messages.
    pub fn stage(&self) -> &'static str {
        match self {
            Error::Http(_) | Error::TokenExchange(_) | Error::InvalidCredentials(_) => "exchange",
            Error::Storage(_) => "storage",
            Error::MissingRefreshToken => "usage",
        }
    }
}

/// Result alias for token operations.
pub type Result<T> = std::result::Result<T, Error>;
