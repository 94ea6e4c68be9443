//! Key-value persistence for settings.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

/// Where settings are persisted, one JSON value per setting name.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// The stored value of a setting, or `None` if it was never saved.
    async fn load(&self, key: &str) -> Result<Option<Value>>;

    async fn save(&self, key: &str, value: Value) -> Result<()>;
}

/// Settings kept in a single JSON object on disk.
///
/// A missing file is an empty store; it is created on the first save.
pub struct JsonFileStore {
    path: PathBuf,
    /// Serialises read-modify-write cycles of the file.
    lock: Mutex<()>,
}
impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Map<String, Value>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e).or_raise(|| ErrorKind::Store),
        };
        serde_json::from_slice(&bytes).or_raise(|| ErrorKind::Store)
    }
}

#[async_trait]
impl SettingsStore for JsonFileStore {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.remove(key))
    }

    async fn save(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut settings = self.read().await?;
        settings.insert(key.to_string(), value);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Store)?;
        }
        let bytes = serde_json::to_vec_pretty(&settings).or_raise(|| ErrorKind::Store)?;
        let temporary = self.path.with_extension("json.tmp");
        fs::write(&temporary, bytes).await.or_raise(|| ErrorKind::Store)?;
        fs::rename(&temporary, &self.path).await.or_raise(|| ErrorKind::Store)?;
        tracing::debug!(key, path = %self.path.display(), "Setting saved");
        Ok(())
    }
}

/// Settings kept in memory; for tests and throwaway runs.
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, Value>>,
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn save(&self, key: &str, value: Value) -> Result<()> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }
}
