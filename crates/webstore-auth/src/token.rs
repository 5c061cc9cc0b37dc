//! OAuth token exchange and refresh
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (first fetch for a code)
//! 2. Token refresh (explicit `TokenManager::refresh`)
//!
//! Both operations POST a form body to the same endpoint with different grant
//! types. There is no retry here: a failed call is returned to the caller as-is.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::{GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN, REDIRECT_URI, TOKEN_ENDPOINT};
use crate::error::{Error, Result};
use crate::metrics;
use crate::secret::Secret;

/// Response from the token endpoint for both exchange and refresh.
///
/// Refresh responses commonly omit `refresh_token`; the token manager merges
/// the previous value back in. Other fields (`expires_in`, `token_type`) are
/// ignored.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Client for the OAuth token endpoint, bound to one client ID/secret pair.
#[derive(Debug, Clone)]
pub struct ExchangeClient {
    http: reqwest::Client,
    endpoint: String,
    client_id: String,
    client_secret: Secret,
}

impl ExchangeClient {
    /// Create a client posting to the Google token endpoint.
    pub fn new(client_id: impl Into<String>, client_secret: Secret) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: TOKEN_ENDPOINT.to_string(),
            client_id: client_id.into(),
            client_secret,
        }
    }

    /// Override the token endpoint URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Use a preconfigured HTTP client (timeouts, proxies).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Exchange an authorization code for tokens.
    ///
    /// The code was pasted from the consent page, so the redirect URI is the
    /// out-of-band value.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
        self.post_grant(
            GRANT_AUTHORIZATION_CODE,
            &[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose()),
                ("code", code),
                ("grant_type", GRANT_AUTHORIZATION_CODE),
                ("redirect_uri", REDIRECT_URI),
            ],
        )
        .await
    }

    /// Mint a new access token from a refresh token.
    pub async fn refresh_token(&self, refresh: &str) -> Result<TokenResponse> {
        self.post_grant(
            GRANT_REFRESH_TOKEN,
            &[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose()),
                ("grant_type", GRANT_REFRESH_TOKEN),
                ("refresh_token", refresh),
            ],
        )
        .await
    }

    async fn post_grant(&self, grant: &'static str, form: &[(&str, &str)]) -> Result<TokenResponse> {
        debug!(grant, endpoint = %self.endpoint, "posting grant to token endpoint");
        let started = Instant::now();
        let result = self.send(grant, form).await;
        metrics::record_exchange(grant, result.is_ok(), started.elapsed().as_secs_f64());
        result
    }

    async fn send(&self, grant: &'static str, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .post(&self.endpoint)
            .form(form)
            .send()
            .await
            .map_err(|e| Error::Http(format!("{grant} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            warn!(grant, %status, "token endpoint rejected grant");

            // 401/403 means the client credentials or the grant itself were refused
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(Error::InvalidCredentials(format!(
                    "{grant} rejected ({status}): {body}"
                )));
            }

            return Err(Error::TokenExchange(format!(
                "token endpoint returned {status} for {grant}: {body}"
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Error::TokenExchange(format!("invalid {grant} response: {e}")))
    }
}
