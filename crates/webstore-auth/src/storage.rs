//! Token storage keyed by authorization code
//!
//! `TokenStorage` is the narrow contract the token manager depends on: look a
//! record up by code, or upsert one. Reads never fail: state that is missing or
//! cannot be parsed is treated as empty. Writes report failure so the caller
//! knows durability was not achieved.
//!
//! `FileStorage` keeps a JSON file mapping codes to records. The file is read
//! lazily on first access and held in memory afterwards. Every write holds the
//! store's Mutex for the whole load-mutate-persist cycle, so managers sharing
//! one store never drop each other's keys.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::token::TokenResponse;

/// Access/refresh token pair cached and persisted per authorization code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Bearer token for API calls
    pub access_token: String,
    /// Absent if the authorization server never issued one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenRecord {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }

    /// Apply a refresh response on top of this record.
    ///
    /// The access token is always replaced. The refresh token is replaced only
    /// when the response carries one; otherwise the current one is kept.
    pub fn merge(&self, response: TokenResponse) -> TokenRecord {
        TokenRecord {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or_else(|| self.refresh_token.clone()),
        }
    }
}

impl From<TokenResponse> for TokenRecord {
    fn from(response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
        }
    }
}

/// Persistence for token records, keyed by authorization code.
///
/// Uses `Pin<Box<dyn Future>>` return types so managers can hold an
/// `Arc<dyn TokenStorage>`.
pub trait TokenStorage: Send + Sync {
    /// Record stored for `code`, if any.
    fn get<'a>(
        &'a self,
        code: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<TokenRecord>> + Send + 'a>>;

    /// Upsert the record for `code` and persist it. Returns the stored record.
    fn set<'a>(
        &'a self,
        code: &'a str,
        access_token: String,
        refresh_token: Option<String>,
    ) -> Pin<Box<dyn Future<Output = Result<TokenRecord>> + Send + 'a>>;
}

/// JSON file backed token storage.
///
/// `None` in the state means the file has not been read yet.
pub struct FileStorage {
    path: PathBuf,
    state: Mutex<Option<HashMap<String, TokenRecord>>>,
}

impl FileStorage {
    /// Create a store for the given file. Nothing is read until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn loaded<'a>(
        &self,
        state: &'a mut Option<HashMap<String, TokenRecord>>,
    ) -> &'a mut HashMap<String, TokenRecord> {
        if state.is_none() {
            *state = Some(load_records(&self.path).await);
        }
        state.get_or_insert_with(HashMap::new)
    }
}

impl TokenStorage for FileStorage {
    fn get<'a>(
        &'a self,
        code: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<TokenRecord>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let records = self.loaded(&mut state).await;
            records.get(code).cloned()
        })
    }

    fn set<'a>(
        &'a self,
        code: &'a str,
        access_token: String,
        refresh_token: Option<String>,
    ) -> Pin<Box<dyn Future<Output = Result<TokenRecord>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let records = self.loaded(&mut state).await;
            let record = TokenRecord::new(access_token, refresh_token);
            records.insert(code.to_string(), record.clone());
            debug!(code, "stored token record");
            write_atomic(&self.path, records).await?;
            Ok(record)
        })
    }
}

/// Read the token file, treating a missing or unusable file as empty state.
async fn load_records(path: &Path) -> HashMap<String, TokenRecord> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "token file not found, starting with empty store");
            return HashMap::new();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "token file unreadable, starting with empty store");
            return HashMap::new();
        }
    };

    match serde_json::from_str::<HashMap<String, TokenRecord>>(&contents) {
        Ok(records) => {
            info!(path = %path.display(), codes = records.len(), "loaded token file");
            records
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "token file malformed, starting with empty store");
            HashMap::new()
        }
    }
}

/// Sequence for temp file names, unique across stores within the process
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Write the token map to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Each write gets its own temp file, so separate stores on the
/// same path never rename each other's. Permissions are 0600 on unix since
/// the file holds tokens.
async fn write_atomic(path: &Path, data: &HashMap<String, TokenRecord>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Storage(format!("serializing token records: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Storage("token file path has no parent directory".into()))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Storage("token file path has no file name".into()))?;

    let tmp_path = dir.join(format!(
        ".{}.tmp.{}.{}",
        file_name.to_string_lossy(),
        std::process::id(),
        TMP_SEQ.fetch_add(1, Ordering::Relaxed)
    ));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Storage(format!("writing temp token file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Storage(format!("setting token file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Storage(format!("renaming temp token file: {e}")))?;

    debug!(path = %path.display(), "persisted token file");
    Ok(())
}

/// Process-local token storage with no durability.
#[derive(Default)]
pub struct MemoryStorage {
    records: Mutex<HashMap<String, TokenRecord>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the given records already stored.
    pub fn with_records(records: impl IntoIterator<Item = (String, TokenRecord)>) -> Self {
        Self {
            records: Mutex::new(records.into_iter().collect()),
        }
    }
}

impl TokenStorage for MemoryStorage {
    fn get<'a>(
        &'a self,
        code: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<TokenRecord>> + Send + 'a>> {
        Box::pin(async move { self.records.lock().await.get(code).cloned() })
    }

    fn set<'a>(
        &'a self,
        code: &'a str,
        access_token: String,
        refresh_token: Option<String>,
    ) -> Pin<Box<dyn Future<Output = Result<TokenRecord>> + Send + 'a>> {
        Box::pin(async move {
            let record = TokenRecord::new(access_token, refresh_token);
            self.records
                .lock()
                .await
                .insert(code.to_string(), record.clone());
            Ok(record)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(access: &str, refresh: &str) -> TokenRecord {
        TokenRecord::new(access, Some(refresh.to_string()))
    }

    #[test]
    fn merge_keeps_previous_refresh_token_when_omitted() {
        let previous = record("1", "R1");
        let merged = previous.merge(TokenResponse {
            access_token: "5".into(),
            refresh_token: None,
        });
        assert_eq!(merged, record("5", "R1"));
    }

    #[test]
    fn merge_takes_new_refresh_token_when_present() {
        let previous = record("1", "R1");
        let merged = previous.merge(TokenResponse {
            access_token: "5".into(),
            refresh_token: Some("R2".into()),
        });
        assert_eq!(merged, record("5", "R2"));
    }

    #[test]
    fn record_without_refresh_token_omits_field() {
        let json = serde_json::to_string(&TokenRecord::new("1", None)).unwrap();
        assert_eq!(json, r#"{"access_token":"1"}"#);
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty_without_creating_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        let store = FileStorage::new(path.clone());
        assert!(store.get("code").await.is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn malformed_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let store = FileStorage::new(path.clone());
        assert!(store.get("code").await.is_none());

        // A later write replaces the broken file with valid JSON
        store.set("code", "1".into(), Some("2".into())).await.unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: HashMap<String, TokenRecord> = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed["code"], record("1", "2"));
    }

    #[tokio::test]
    async fn set_persists_for_a_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        let store = FileStorage::new(path.clone());
        let stored = store.set("code", "1".into(), Some("2".into())).await.unwrap();
        assert_eq!(stored, record("1", "2"));

        let reopened = FileStorage::new(path);
        assert_eq!(reopened.get("code").await, Some(record("1", "2")));
    }

    #[tokio::test]
    async fn durable_format_maps_code_to_token_pair() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        let store = FileStorage::new(path.clone());
        store.set("code", "1".into(), Some("2".into())).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "code": { "access_token": "1", "refresh_token": "2" } })
        );
    }

    #[tokio::test]
    async fn first_set_keeps_records_already_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        tokio::fs::write(
            &path,
            r#"{"other":{"access_token":"a","refresh_token":"b"}}"#,
        )
        .await
        .unwrap();

        // No get() before the write: set must still load before persisting
        let store = FileStorage::new(path.clone());
        store.set("code", "1".into(), None).await.unwrap();

        let reopened = FileStorage::new(path);
        assert_eq!(reopened.get("other").await, Some(record("a", "b")));
        assert_eq!(reopened.get("code").await, Some(TokenRecord::new("1", None)));
    }

    #[tokio::test]
    async fn file_is_read_only_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        tokio::fs::write(&path, r#"{"code":{"access_token":"1"}}"#)
            .await
            .unwrap();

        let store = FileStorage::new(path.clone());
        assert_eq!(store.get("code").await.unwrap().access_token, "1");

        tokio::fs::write(&path, r#"{"code":{"access_token":"changed"}}"#)
            .await
            .unwrap();
        assert_eq!(store.get("code").await.unwrap().access_token, "1");
    }

    #[tokio::test]
    async fn failed_write_reports_storage_error_and_keeps_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("tokens.json");

        let store = FileStorage::new(path);
        let err = store.set("code", "1".into(), None).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)), "got {err:?}");
        assert_eq!(store.get("code").await, Some(TokenRecord::new("1", None)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        let store = FileStorage::new(path.clone());
        store.set("code", "1".into(), None).await.unwrap();

        let metadata = tokio::fs::metadata(&path).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "token file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn concurrent_writes_for_different_codes_are_all_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let store = Arc::new(FileStorage::new(path.clone()));

        let mut handles = vec![];
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .set(&format!("code-{i}"), format!("at_{i}"), Some(format!("rt_{i}")))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: HashMap<String, TokenRecord> = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.len(), 10);
        assert_eq!(parsed["code-7"], record("at_7", "rt_7"));
    }

    #[tokio::test]
    async fn stores_sharing_a_path_do_not_collide_on_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let a = Arc::new(FileStorage::new(path.clone()));
        let b = Arc::new(FileStorage::new(path.clone()));

        for round in 0..50 {
            let (a, b) = (a.clone(), b.clone());
            let write_a = tokio::spawn(async move {
                a.set("a", format!("at_a_{round}"), None).await
            });
            let write_b = tokio::spawn(async move {
                b.set("b", format!("at_b_{round}"), None).await
            });
            write_a.await.unwrap().unwrap();
            write_b.await.unwrap().unwrap();
        }

        // No temp files left behind next to the token file
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut names = vec![];
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["tokens.json"]);
    }

    #[tokio::test]
    async fn memory_storage_isolates_codes() {
        let store = MemoryStorage::with_records([("a".to_string(), record("1", "2"))]);
        assert_eq!(store.get("a").await, Some(record("1", "2")));
        assert!(store.get("b").await.is_none());

        store.set("b", "3".into(), Some("4".into())).await.unwrap();
        assert_eq!(store.get("a").await, Some(record("1", "2")));
        assert_eq!(store.get("b").await, Some(record("3", "4")));
    }
}
