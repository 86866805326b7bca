use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::KeyValueStore;
use crate::error::StoreError;

/// Extension of every record file written by the store
const RECORD_EXTENSION: &str = "json";

/// Extension of in-progress writes, ignored when listing keys
const TEMP_EXTENSION: &str = "tmp";

/// Distinguishes temp files of overlapping writes within one process
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// On-disk record: the original key travels with its value.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    key: String,
    value: String,
}

/// Stores each key as a JSON file inside a single directory.
///
/// File names are the hex SHA-256 of the key, so they have a fixed length,
/// contain only `[0-9a-f]`, and keys differing only in case never share a
/// file. Writes go to a temp file that is renamed into place, so a reader
/// sees either the previous record or the new one.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey("empty key".to_string()));
        }
        Ok(self
            .dir
            .join(format!("{}.{}", file_stem(key), RECORD_EXTENSION)))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(
            "{}.{}.{}.{}",
            file_stem(key),
            std::process::id(),
            seq,
            TEMP_EXTENSION
        ))
    }

    async fn read_record(path: &Path) -> Result<Option<StoredRecord>, StoreError> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&contents) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                debug!(file = ?path, error = %e, "Skipping unreadable record file");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.record_path(key)?;
        match Self::read_record(&path).await? {
            Some(record) if record.key == key => Ok(Some(record.value)),
            Some(record) => {
                debug!(key = %key, stored = %record.key, "Record file belongs to another key");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.record_path(key)?;
        let record = StoredRecord {
            key: key.to_string(),
            value: value.to_string(),
        };
        let contents = serde_json::to_string(&record)?;

        let temp = self.temp_path(key);
        tokio::fs::write(&temp, contents).await?;
        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        let path = self.record_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_all_keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(record) = Self::read_record(&path).await? {
                keys.push(record.key);
            }
        }
        Ok(keys)
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<(), StoreError> {
        for key in keys {
            self.remove_item(key).await?;
        }
        Ok(())
    }
}

fn file_stem(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}
