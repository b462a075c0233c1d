//! Key-value storage on the device: the bearer token, the user id and the preferences blob.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Preferences;
use crate::errors::{ClientError, Result};

pub const TOKEN_KEY: &str = "token";
pub const USER_ID_KEY: &str = "user-id";
pub const PREFERENCES_KEY: &str = "preferences";

const STORE_FILE: &str = "storage.json";
const STAGING_EXTENSION: &str = "json.tmp";

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Ephemeral store, used by tests and hosts without a writable data dir.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().map_err(poisoned)?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object file.
/// The whole map is kept in memory and rewritten on every change.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: tokio::sync::Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Opens (or creates) the store file inside `dir`.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|err| ClientError::Storage(err.to_string()))?;

        let path = dir.join(STORE_FILE);
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!("Discarding unreadable storage file {}: {}", path.display(), err);
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(ClientError::Storage(err.to_string())),
        };

        debug!("Opened storage at {}", path.display());

        Ok(Self {
            path,
            entries: tokio::sync::Mutex::new(entries),
        })
    }

    async fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let bytes =
            serde_json::to_vec_pretty(entries).map_err(|err| ClientError::Storage(err.to_string()))?;
        let staging = self.path.with_extension(STAGING_EXTENSION);
        tokio::fs::write(&staging, bytes)
            .await
            .map_err(|err| ClientError::Storage(err.to_string()))?;

        // Rename swaps the file atomically.
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|err| ClientError::Storage(err.to_string()))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if entries.remove(key).is_some() {
            self.flush(&entries).await?;
        }
        Ok(())
    }
}

/// Reads the preferences blob. Missing or corrupt blobs yield the defaults.
pub async fn load_preferences(store: &dyn KeyValueStore) -> Result<Preferences> {
    let Some(raw) = store.get(PREFERENCES_KEY).await? else {
        return Ok(Preferences::default());
    };

    match serde_json::from_str::<Preferences>(&raw) {
        Ok(prefs) => Ok(prefs.normalized()),
        Err(err) => {
            warn!("Ignoring malformed preferences: {}", err);
            Ok(Preferences::default())
        }
    }
}

pub async fn save_preferences(store: &dyn KeyValueStore, prefs: &Preferences) -> Result<()> {
    let raw = serde_json::to_string(prefs).map_err(|err| ClientError::Storage(err.to_string()))?;
    store.set(PREFERENCES_KEY, &raw).await
}

fn poisoned<T>(_: T) -> ClientError {
    ClientError::Storage("storage lock poisoned".to_string())
}
