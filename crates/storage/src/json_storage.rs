//! JSON file storage implementation.
//!
//! Stores each key as a pretty-printed JSON file under `data/` and keeps a
//! small per-key meta marker (version + updated_at) under `meta/`. Writes go
//! to a temporary file first and are renamed into place.

use super::trait_::validate_key;
use super::{LearningStore, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

/// File-based JSON learning store.
pub struct JsonFileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Create storage rooted at `root`, creating the `data/` and `meta/`
    /// subdirectories if needed.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("data")).await?;
        fs::create_dir_all(root.join("meta")).await?;

        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn data_path(&self, key: &str) -> PathBuf {
        self.root.join("data").join(format!("{}.json", key))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join("meta").join(format!("{}.meta.json", key))
    }

    /// Current version of `key` (0 if never written).
    pub async fn version(&self, key: &str) -> Result<u64> {
        validate_key(key)?;
        Ok(read_json(&self.meta_path(key))
            .await?
            .and_then(|meta| meta.get("version").and_then(Value::as_u64))
            .unwrap_or(0))
    }

    /// Read and increment the per-key version, return the new version.
    async fn bump_version(&self, key: &str) -> Result<u64> {
        let version = self.version(key).await? + 1;
        let meta = serde_json::json!({"version": version, "updated_at": chrono::Utc::now()});
        write_atomic(&self.meta_path(key), &serde_json::to_string_pretty(&meta)?).await?;
        Ok(version)
    }
}

#[async_trait]
impl LearningStore for JsonFileStore {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        validate_key(key)?;
        read_json(&self.data_path(key)).await
    }

    async fn save(&self, key: &str, value: &Value) -> Result<()> {
        validate_key(key)?;
        let _guard = self.write_lock.lock().await;

        let json = serde_json::to_string_pretty(value)?;
        write_atomic(&self.data_path(key), &json).await?;
        let version = self.bump_version(key).await?;

        debug!("Saved {} (version {})", key, version);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        let _guard = self.write_lock.lock().await;

        for path in [self.data_path(key), self.meta_path(key)] {
            fs::remove_file(&path).await.or_else(|e| {
                if e.kind() == std::io::ErrorKind::NotFound { Ok(()) } else { Err(e) }
            })?;
        }
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let data_root = self.root.join("data");
        let mut keys = Vec::new();
        let mut pending = vec![data_root.clone()];

        while let Some(dir) = pending.pop() {
            let mut rd = fs::read_dir(&dir).await?;
            while let Some(entry) = rd.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                if path.extension().and_then(|s| s.to_str()) != Some("json") {
                    continue;
                }
                if let Ok(rel) = path.with_extension("").strip_prefix(&data_root) {
                    let key: Vec<String> = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect();
                    keys.push(key.join("/"));
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents.as_bytes()).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

async fn read_json(path: &Path) -> Result<Option<Value>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_roundtrip_and_versions() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).await.unwrap();

        assert_eq!(store.version("qlearning/qtable").await.unwrap(), 0);
        store.save("qlearning/qtable", &json!({"steps": 1})).await.unwrap();
        store.save("qlearning/qtable", &json!({"steps": 2})).await.unwrap();

        assert_eq!(store.version("qlearning/qtable").await.unwrap(), 2);
        assert_eq!(
            store.load("qlearning/qtable").await.unwrap(),
            Some(json!({"steps": 2}))
        );
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonFileStore::new(dir.path()).await.unwrap();
            store.save("analytics/cost_history", &json!([1.0, 2.0])).await.unwrap();
        }
        let store = JsonFileStore::new(dir.path()).await.unwrap();
        assert_eq!(
            store.load("analytics/cost_history").await.unwrap(),
            Some(json!([1.0, 2.0]))
        );
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).await.unwrap();
        store.save("b", &json!(1)).await.unwrap();
        store.save("a/nested", &json!(2)).await.unwrap();

        assert_eq!(
            store.list_keys().await.unwrap(),
            vec!["a/nested".to_string(), "b".to_string()]
        );

        store.delete("b").await.unwrap();
        store.delete("missing").await.unwrap();
        assert_eq!(store.list_keys().await.unwrap(), vec!["a/nested".to_string()]);
        assert_eq!(store.version("b").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_key_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).await.unwrap();
        assert!(store.load("nothing/here").await.unwrap().is_none());
    }
}
