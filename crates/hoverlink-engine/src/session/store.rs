use async_trait::async_trait;
use hoverlink_common::protocol::TabId;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;

pub const STATE_KEY_PREFIX: &str = "hoverlink:tab:";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub fn storage_key(tab_id: TabId) -> String {
    format!("{}{}", STATE_KEY_PREFIX, tab_id)
}

/// Session-lifetime key/value store backing per-tab state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Lives as long as the process; what a browser session store gives the extension.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// One JSON file per key. Survives a service restart within the same session directory.
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.base_path.join(format!("{}.json", file_name))
    }
}

#[async_trait]
impl SessionStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        if !self.base_path.exists() {
            fs::create_dir_all(&self.base_path).await?;
        }
        let json = serde_json::to_string(&value)?;
        fs::write(self.path_for(key), json).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(path).await?;
        }
        Ok(())
    }
}
