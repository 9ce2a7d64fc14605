//! Directory-backed storage.
//!
//! Values live in `<root>/<key>.json`, exports in `<root>/exports/`.
//! Imports read whichever path was staged with `stage_import`.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use ai_lawyer_core::{FileExchange, KeyValueStore, StorageError};
use async_trait::async_trait;

/// Filesystem storage rooted at one directory.
#[derive(Clone)]
pub struct DirStorage {
    root: PathBuf,
    staged: Arc<Mutex<Option<PathBuf>>>,
}

impl DirStorage {
    /// Use `root` as the storage directory; it is created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            staged: Arc::new(Mutex::new(None)),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory exported chats are written to.
    #[must_use]
    pub fn export_dir(&self) -> PathBuf {
        self.root.join("exports")
    }

    /// Choose the file the next `pick_file_for_read` returns.
    pub fn stage_import(&self, path: impl Into<PathBuf>) -> Result<(), StorageError> {
        *self
            .staged
            .lock()
            .map_err(|e| StorageError::Internal(e.to_string()))? = Some(path.into());
        Ok(())
    }

    fn value_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(StorageError::Internal(format!("invalid key: {key:?}")));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

/// Write through a sibling temp file so readers never see a partial value.
async fn write_whole(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl KeyValueStore for DirStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match tokio::fs::read_to_string(self.value_path(key)?).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        write_whole(&self.value_path(key)?, value.as_bytes()).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.value_path(key)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl FileExchange for DirStorage {
    async fn pick_file_for_read(&self) -> Result<Option<Vec<u8>>, StorageError> {
        let staged = self
            .staged
            .lock()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .take();
        let Some(path) = staged else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save_bytes_as_file(
        &self,
        bytes: &[u8],
        suggested_name: &str,
    ) -> Result<(), StorageError> {
        let name = Path::new(suggested_name)
            .file_name()
            .ok_or_else(|| StorageError::Internal(format!("invalid file name: {suggested_name:?}")))?;
        let path = self.export_dir().join(name);
        write_whole(&path, bytes).await?;
        tracing::info!(path = %path.display(), "Saved chat file");
        Ok(())
    }
}
