//! File-backed credential store.
//!
//! Mirrors browser local storage: an unencrypted flat string map with no
//! restrictions on key names. The whole map lives in one JSON file, loaded
//! on first use and rewritten atomically (temp file + rename) on every
//! mutation.

use crate::{CredentialStore, StorageResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// JSON file key-value store.
pub struct LocalStore {
    path: PathBuf,
    cache: Mutex<Option<BTreeMap<String, String>>>,
}

impl LocalStore {
    /// Create a store backed by `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> StorageResult<BTreeMap<String, String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => match serde_json::from_str(&content) {
                Ok(map) => Ok(map),
                Err(e) => {
                    // A corrupt file must not lock the user out; start empty.
                    warn!(path = %self.path.display(), error = %e, "Local store unreadable, starting empty");
                    Ok(BTreeMap::new())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, map: &BTreeMap<String, String>) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_vec_pretty(map)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Run `f` against the loaded map, writing it back when `f` reports a change.
    async fn with_map<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> (T, bool),
    {
        let mut guard = self.cache.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        let map = guard.get_or_insert_with(BTreeMap::new);
        let (result, changed) = f(map);
        if changed {
            self.persist(map).await?;
        }
        Ok(result)
    }
}

#[async_trait]
impl CredentialStore for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.with_map(|map| (map.get(key).cloned(), false)).await
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        debug!(path = %self.path.display(), key = %key, "Setting local entry");
        self.with_map(|map| {
            let changed = map.get(key).map(String::as_str) != Some(value);
            map.insert(key.to_string(), value.to_string());
            ((), changed)
        })
        .await
    }

    async fn remove(&self, key: &str) -> StorageResult<bool> {
        self.with_map(|map| {
            let removed = map.remove(key).is_some();
            (removed, removed)
        })
        .await
    }
}
