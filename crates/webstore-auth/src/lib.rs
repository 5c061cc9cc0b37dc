//! OAuth token management for Chrome Web Store publishing
//!
//! Turns one authorization code into a bearer token for the store API and
//! keeps that token available across calls and process restarts. This crate
//! is a standalone library with no dependency on the CLI.
//!
//! Token flow:
//! 1. Caller builds an `ExchangeClient` with the OAuth client ID/secret
//! 2. `TokenManager::new(code, client)`, optionally `.with_storage(...)`
//! 3. `TokenManager::get()` serves the cache, else the stored record, else
//!    exchanges the authorization code via `ExchangeClient::exchange_code()`
//! 4. The new record is cached and written through `TokenStorage::set()`
//! 5. `TokenManager::refresh()` calls `ExchangeClient::refresh_token()` and
//!    merges the response into the cached record

pub mod constants;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod secret;
pub mod storage;
pub mod token;

#[cfg(test)]
mod testing;

pub use constants::*;
pub use error::{Error, Result};
pub use manager::{TokenManager, TokenState};
pub use secret::Secret;
pub use storage::{FileStorage, MemoryStorage, TokenRecord, TokenStorage};
pub use token::{ExchangeClient, TokenResponse};
