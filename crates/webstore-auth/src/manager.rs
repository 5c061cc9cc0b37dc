//! Token manager for a single authorization code
//!
//! Resolves an access token from, in order: the in-memory cache, the
//! configured storage, the token endpoint. Once a record is cached every
//! `get()` is served from memory with no I/O.
//!
//! State transitions:
//! - Empty → Cached (record adopted from storage)
//! - Empty → Fetching → Cached (authorization code exchanged)
//! - Fetching → Empty (exchange failed, nothing cached)
//! - Cached → Refreshing → Cached (refresh succeeded or failed)
//!
//! Exchanges are serialised per manager by a Mutex. A caller that waited on
//! it re-checks the cache before sending anything, so overlapping first calls
//! result in one exchange. The cache itself sits behind an RwLock that is
//! never held across network or storage I/O, so `get()` keeps serving the
//! previous token while a refresh is outstanding.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::storage::{TokenRecord, TokenStorage};
use crate::token::ExchangeClient;

/// Lifecycle state of a token manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// No cached record and nothing in flight
    Empty,
    /// Authorization code exchange outstanding
    Fetching,
    /// A record is held in memory
    Cached,
    /// Refresh token exchange outstanding
    Refreshing,
}

impl TokenState {
    /// Status label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            TokenState::Empty => "empty",
            TokenState::Fetching => "fetching",
            TokenState::Cached => "cached",
            TokenState::Refreshing => "refreshing",
        }
    }
}

struct Cache {
    record: Option<TokenRecord>,
    state: TokenState,
}

/// Caches and refreshes the OAuth tokens minted from one authorization code.
pub struct TokenManager {
    code: String,
    exchange: ExchangeClient,
    storage: Option<Arc<dyn TokenStorage>>,
    cache: RwLock<Cache>,
    exchange_lock: Mutex<()>,
}

impl TokenManager {
    /// Create a manager with in-memory caching only.
    pub fn new(code: impl Into<String>, exchange: ExchangeClient) -> Self {
        Self {
            code: code.into(),
            exchange,
            storage: None,
            cache: RwLock::new(Cache {
                record: None,
                state: TokenState::Empty,
            }),
            exchange_lock: Mutex::new(()),
        }
    }

    /// Persist records through `storage`, and consult it before exchanging.
    pub fn with_storage(mut self, storage: Arc<dyn TokenStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// The authorization code, also used as the storage key.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Current lifecycle state, for logging and diagnostics.
    pub async fn state(&self) -> TokenState {
        self.cache.read().await.state
    }

    /// Clone of the cached record, without touching storage or the network.
    pub async fn cached(&self) -> Option<TokenRecord> {
        self.cache.read().await.record.clone()
    }

    /// Return a usable access token.
    ///
    /// Serves the cached token when there is one. Otherwise adopts the stored
    /// record for this code, or exchanges the authorization code and persists
    /// the result. On exchange failure nothing is cached and the next call
    /// tries again.
    pub async fn get(&self) -> Result<String> {
        if let Some(token) = self.cached_access_token().await {
            debug!(code = %self.code, "serving cached access token");
            return Ok(token);
        }

        let _exchange = self.exchange_lock.lock().await;

        if let Some(token) = self.cached_access_token().await {
            debug!(code = %self.code, "access token cached while waiting");
            return Ok(token);
        }

        if let Some(record) = self.adopt_stored().await {
            return Ok(record.access_token);
        }

        self.set_state(TokenState::Fetching).await;
        let response = match self.exchange.exchange_code(&self.code).await {
            Ok(response) => response,
            Err(e) => {
                self.set_state(TokenState::Empty).await;
                warn!(code = %self.code, stage = e.stage(), error = %e, "authorization code exchange failed");
                return Err(e);
            }
        };
        info!(
            code = %self.code,
            refresh_token = response.refresh_token.is_some(),
            "authorization code exchanged"
        );

        self.install(TokenRecord::from(response)).await
    }

    /// Mint a new access token with the refresh token.
    ///
    /// The refresh token comes from the cache, or from storage when nothing is
    /// cached yet. Fails with `MissingRefreshToken` without sending a request
    /// if neither has one. A refresh response without `refresh_token` keeps
    /// the previous one. On failure the previous cache is left as it was.
    pub async fn refresh(&self) -> Result<String> {
        let _exchange = self.exchange_lock.lock().await;

        let previous = match self.cached().await {
            Some(record) => record,
            None => self
                .adopt_stored()
                .await
                .ok_or(Error::MissingRefreshToken)?,
        };
        let refresh = previous
            .refresh_token
            .clone()
            .ok_or(Error::MissingRefreshToken)?;

        self.set_state(TokenState::Refreshing).await;
        let response = match self.exchange.refresh_token(&refresh).await {
            Ok(response) => response,
            Err(e) => {
                self.set_state(TokenState::Cached).await;
                warn!(code = %self.code, stage = e.stage(), error = %e, "token refresh failed");
                return Err(e);
            }
        };
        info!(
            code = %self.code,
            rotated = response.refresh_token.is_some(),
            "access token refreshed"
        );

        self.install(previous.merge(response)).await
    }

    async fn cached_access_token(&self) -> Option<String> {
        let cache = self.cache.read().await;
        cache.record.as_ref().map(|r| r.access_token.clone())
    }

    async fn set_state(&self, state: TokenState) {
        self.cache.write().await.state = state;
    }

    /// Look the code up in storage and cache the record if found.
    async fn adopt_stored(&self) -> Option<TokenRecord> {
        let storage = self.storage.as_ref()?;
        let record = storage.get(&self.code).await?;
        debug!(code = %self.code, "adopted stored token record");

        let mut cache = self.cache.write().await;
        cache.record = Some(record.clone());
        cache.state = TokenState::Cached;
        Some(record)
    }

    /// Cache a new record, then persist it if storage is configured.
    ///
    /// A storage failure is returned to the caller but the cache keeps the
    /// new record: the token is still valid for this process.
    async fn install(&self, record: TokenRecord) -> Result<String> {
        let access_token = record.access_token.clone();
        {
            let mut cache = self.cache.write().await;
            cache.record = Some(record.clone());
            cache.state = TokenState::Cached;
        }

        if let Some(storage) = &self.storage {
            storage
                .set(&self.code, record.access_token, record.refresh_token)
                .await
                .inspect_err(|e| {
                    warn!(code = %self.code, error = %e, "failed to persist token record");
                })?;
        }

        Ok(access_token)
    }
}
