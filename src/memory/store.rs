//! Key-value persistence for profiles and turn history
//!
//! The only storage seam in the crate. Values are JSON text; the typed
//! helpers below do the encoding so stores stay dumb.

use crate::core::error::{Result, VoiceError};
use ahash::AHashMap;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::Mutex;
use uuid::Uuid;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> Result<()>;
    async fn clear(&self, key: &str) -> Result<()>;
}

/// Storage key for a user's preference profile
pub fn profile_key(user_id: &str) -> String {
    format!("profile:{}", user_id)
}

/// Storage key for a user's capped turn history
pub fn history_key(user_id: &str) -> String {
    format!("history:{}", user_id)
}

/// Read and decode a JSON value; missing keys are `Ok(None)`
pub async fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

pub async fn save_json<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let text = serde_json::to_string(value)?;
    store.set(key, text).await
}

/// Process-local store; contents vanish with the process
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<AHashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// One JSON file per key under a directory
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VoiceError::Storage(format!("read {}: {}", key, e))),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| VoiceError::Storage(format!("create {}: {}", self.dir.display(), e)))?;
        // Readers see the old file or the new one, never a partial write
        let path = self.path_for(key);
        let staging = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        if let Err(e) = tokio::fs::write(&staging, value).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(VoiceError::Storage(format!("write {}: {}", key, e)));
        }
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|e| VoiceError::Storage(format!("replace {}: {}", key, e)))
    }

    async fn clear(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VoiceError::Storage(format!("remove {}: {}", key, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "v".into()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        store.clear("k").await.unwrap();
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_file_store_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert_eq!(store.get("profile:nobody").await.unwrap(), None);
        store.clear("profile:nobody").await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_sanitizes_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested"));
        save_json(&store, &profile_key("../alice"), &vec![1, 2, 3]).await.unwrap();

        let loaded: Option<Vec<i32>> = load_json(&store, &profile_key("../alice")).await.unwrap();
        assert_eq!(loaded, Some(vec![1, 2, 3]));
        assert!(dir.path().join("nested").join("profile____alice.json").exists());
    }

    #[tokio::test]
    async fn test_load_json_reports_corrupt_value() {
        let store = MemoryStore::new();
        store.set("history:x", "not json".into()).await.unwrap();
        let result: Result<Option<Vec<String>>> = load_json(&store, "history:x").await;
        assert!(matches!(result, Err(VoiceError::Serde(_))));
    }

    #[tokio::test]
    async fn test_file_store_overwrites_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.set("history:a", "[1]".into()).await.unwrap();
        store.set("history:a", "[1,2]".into()).await.unwrap();

        assert_eq!(store.get("history:a").await.unwrap().as_deref(), Some("[1,2]"));
        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }
}
