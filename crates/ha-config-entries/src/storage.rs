//! JSON persistence in the config directory's `.storage/` folder

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Versioned envelope written around every stored document
///
/// ```json
/// { "version": 1, "minor_version": 1, "key": "core.config_entries", "data": { ... } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageFile<T> {
    pub version: u32,
    pub minor_version: u32,
    pub key: String,
    pub data: T,
}

impl<T> StorageFile<T> {
    pub fn new(key: impl Into<String>, data: T, version: u32, minor_version: u32) -> Self {
        Self {
            version,
            minor_version,
            key: key.into(),
            data,
        }
    }
}

/// Handle on a `.storage/` directory
#[derive(Debug, Clone)]
pub struct Storage {
    storage_dir: PathBuf,
}

impl Storage {
    /// `config_dir` is the Home Assistant config directory; files go in its
    /// `.storage/` subdirectory.
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: config_dir.as_ref().join(".storage"),
        }
    }

    pub fn file_path(&self, key: &str) -> PathBuf {
        self.storage_dir.join(key)
    }

    /// Returns `None` when nothing has been stored under `key` yet.
    pub async fn load<T>(&self, key: &str) -> StorageResult<Option<StorageFile<T>>>
    where
        T: DeserializeOwned,
    {
        let path = self.file_path(key);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let file: StorageFile<T> = serde_json::from_str(&content)?;
        debug!(key, version = file.version, "Loaded storage file");
        Ok(Some(file))
    }

    /// Write through a temp file and rename so readers never see a torn file.
    pub async fn save<T>(&self, file: &StorageFile<T>) -> StorageResult<()>
    where
        T: Serialize,
    {
        fs::create_dir_all(&self.storage_dir).await?;

        let path = self.file_path(&file.key);
        let temp_path = self.file_path(&format!("{}.tmp", file.key));

        fs::write(&temp_path, serde_json::to_string_pretty(file)?).await?;
        fs::rename(&temp_path, &path).await?;

        debug!(key = %file.key, version = file.version, "Saved storage file");
        Ok(())
    }
}
