//! Persistence Port (C2, spec.md §4.2). A typed key/value interface with
//! atomic file-backed writes, grounded on the teacher's temp-file + rename
//! config reload (`lobby.rs::reload_config`), generalized to a full
//! get/put/delete/keys surface.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::fs;
use tokio::sync::Mutex;

use crate::error::{CoreError, CoreResult};

pub const KEY_SESSION_CURRENT: &str = "session:current";
pub const KEY_SCORES_CURRENT: &str = "scores:current";
pub const KEY_OFFLINE_QUEUE: &str = "offlineQueue";
pub const KEY_TOKENS: &str = "tokens";

/// A self-describing blob: schema version plus payload, so a future format
/// change can be detected on load instead of silently misparsed.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct Blob {
    pub schema_version: u32,
    pub payload: serde_json::Value,
}

impl Blob {
    pub fn new<T: Serialize>(value: &T) -> CoreResult<Self> {
        Ok(Self {
            schema_version: 1,
            payload: serde_json::to_value(value)
                .map_err(|e| CoreError::Persistence(e.to_string()))?,
        })
    }

    pub fn decode<T: DeserializeOwned>(self) -> CoreResult<T> {
        serde_json::from_value(self.payload).map_err(|e| CoreError::Persistence(e.to_string()))
    }
}

#[async_trait]
pub trait PersistencePort: Send + Sync {
    async fn get(&self, key: &str) -> CoreResult<Option<Blob>>;
    async fn put(&self, key: &str, blob: Blob) -> CoreResult<()>;
    async fn delete(&self, key: &str) -> CoreResult<()>;
    async fn keys(&self, prefix: &str) -> CoreResult<Vec<String>>;
}

/// File-backed implementation: one JSON file per key under `base_dir`,
/// written via temp-file + rename so a crash mid-write never leaves a
/// partial file (spec.md §4.2, §6 "never partial writes").
pub struct FilePersistence {
    base_dir: PathBuf,
    // Serializes writes so concurrent put()s to different keys can't race
    // on directory listing for keys(); each key still has a single owning
    // service per spec.md §5, this is about the filesystem, not ownership.
    write_lock: Mutex<()>,
}

impl FilePersistence {
    pub async fn new(base_dir: impl Into<PathBuf>) -> CoreResult<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| CoreError::Persistence(e.to_string()))?;
        Ok(Self {
            base_dir,
            write_lock: Mutex::new(()),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe = key.replace(':', "_");
        self.base_dir.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl PersistencePort for FilePersistence {
    async fn get(&self, key: &str) -> CoreResult<Option<Blob>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path).await {
            Ok(contents) => {
                let blob: Blob = serde_json::from_str(&contents)
                    .map_err(|e| CoreError::Persistence(e.to_string()))?;
                Ok(Some(blob))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoreError::Persistence(e.to_string())),
        }
    }

    async fn put(&self, key: &str, blob: Blob) -> CoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");
        let contents =
            serde_json::to_vec_pretty(&blob).map_err(|e| CoreError::Persistence(e.to_string()))?;
        fs::write(&tmp_path, contents)
            .await
            .map_err(|e| CoreError::Persistence(e.to_string()))?;
        fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| CoreError::Persistence(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CoreResult<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::Persistence(e.to_string())),
        }
    }

    async fn keys(&self, prefix: &str) -> CoreResult<Vec<String>> {
        let mut entries = fs::read_dir(&self.base_dir)
            .await
            .map_err(|e| CoreError::Persistence(e.to_string()))?;
        let mut out = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CoreError::Persistence(e.to_string()))?
        {
            if let Some(name) = entry.path().file_stem().and_then(|s| s.to_str()) {
                let key = name.replace('_', ":");
                if key.starts_with(prefix) {
                    out.push(key);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        value: i64,
    }

    #[tokio::test]
    async fn round_trips_put_get() {
        let dir = tempfile_dir();
        let store = FilePersistence::new(&dir).await.unwrap();
        let original = Sample { value: 42 };
        store
            .put(KEY_SCORES_CURRENT, Blob::new(&original).unwrap())
            .await
            .unwrap();
        let loaded: Sample = store
            .get(KEY_SCORES_CURRENT)
            .await
            .unwrap()
            .unwrap()
            .decode()
            .unwrap();
        assert_eq!(loaded, original);
        let _ = fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let dir = tempfile_dir();
        let store = FilePersistence::new(&dir).await.unwrap();
        assert!(store.get("nonexistent").await.unwrap().is_none());
        let _ = fs::remove_dir_all(&dir).await;
    }

    fn tempfile_dir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("aln-persistence-test-{}", uuid::Uuid::new_v4()));
        dir
    }

    #[allow(dead_code)]
    fn _path_hint(p: &Path) -> &Path {
        p
    }
}
