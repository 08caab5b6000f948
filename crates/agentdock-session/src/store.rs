//! Key-value stores and the persisted-session lookup backed by them.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use agentdock_types::{AdapterError, AdapterResult, KeyValueStore, SessionLookup};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes every key starting with one of `prefixes`.
///
/// Returns the number of keys removed.
pub fn purge_prefixed(store: &dyn KeyValueStore, prefixes: &[&str]) -> AdapterResult<usize> {
    let mut removed = 0;
    for key in store.keys()? {
        if prefixes.iter().any(|p| key.starts_with(p)) {
            store.remove(&key)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn keys(&self) -> AdapterResult<Vec<String>> {
        Ok(lock(&self.entries).keys().cloned().collect())
    }

    fn get(&self, key: &str) -> AdapterResult<Option<String>> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AdapterResult<()> {
        lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> AdapterResult<()> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}

/// JSON-object file store, written with restricted permissions (0600).
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read store from {}", self.path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse store from {}", self.path.display()))
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(entries).context("Failed to serialize store")?;

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(&self.path)
            .with_context(|| format!("Failed to open {} for writing", self.path.display()))?;
        file.write_all(contents.as_bytes())
            .with_context(|| format!("Failed to write to {}", self.path.display()))
    }

    fn update(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> AdapterResult<()> {
        let _guard = lock(&self.write_lock);
        let mut entries = self.load().map_err(storage_error)?;
        f(&mut entries);
        self.save(&entries).map_err(storage_error)
    }
}

fn storage_error(err: anyhow::Error) -> AdapterError {
    AdapterError::Storage(format!("{err:#}"))
}

impl KeyValueStore for FileStore {
    fn keys(&self) -> AdapterResult<Vec<String>> {
        Ok(self.load().map_err(storage_error)?.into_keys().collect())
    }

    fn get(&self, key: &str) -> AdapterResult<Option<String>> {
        Ok(self.load().map_err(storage_error)?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> AdapterResult<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> AdapterResult<()> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

/// Provider session persisted under `<identity_prefix>session`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub token: String,
    /// Expiry as Unix epoch milliseconds.
    pub expires_at_ms: i64,
}

impl PersistedSession {
    pub fn new(token: impl Into<String>, ttl: chrono::Duration) -> Self {
        Self {
            token: token.into(),
            expires_at_ms: (chrono::Utc::now() + ttl).timestamp_millis(),
        }
    }

    pub fn is_expired(&self) -> bool {
        chrono::Utc::now().timestamp_millis() >= self.expires_at_ms
    }

    pub fn load(store: &dyn KeyValueStore, key: &str) -> AdapterResult<Option<Self>> {
        let Some(raw) = store.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(err) => {
                debug!(key, "unreadable persisted session: {err}");
                Ok(None)
            }
        }
    }

    pub fn save(&self, store: &dyn KeyValueStore, key: &str) -> AdapterResult<()> {
        let raw = serde_json::to_string(self)
            .map_err(|e| AdapterError::Storage(format!("serialize session: {e}")))?;
        store.set(key, &raw)
    }
}

/// Persisted-session lookup over a [`KeyValueStore`].
pub struct StoredSessionLookup {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl StoredSessionLookup {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }
}

#[async_trait]
impl SessionLookup for StoredSessionLookup {
    async fn has_valid_token(&self) -> AdapterResult<bool> {
        let session = PersistedSession::load(self.store.as_ref(), &self.key)?;
        Ok(session.is_some_and(|s| !s.token.is_empty() && !s.is_expired()))
    }
}
