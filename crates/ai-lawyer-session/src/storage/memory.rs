//! In-memory storage.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use ai_lawyer_core::{FileExchange, KeyValueStore, StorageError};
use async_trait::async_trait;

/// A file handed to `save_bytes_as_file`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
struct Inner {
    values: RwLock<HashMap<String, String>>,
    picks: RwLock<VecDeque<Vec<u8>>>,
    saved: RwLock<Vec<SavedFile>>,
    read_only: AtomicBool,
}

/// In-memory key/value store and file exchange.
///
/// Useful for tests and embedding. Clones share state.
/// Data is lost on restart.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Inner>,
}

impl MemoryStorage {
    /// Create an empty in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a file the next `pick_file_for_read` returns.
    pub fn stage_file(&self, bytes: impl Into<Vec<u8>>) -> Result<(), StorageError> {
        self.inner
            .picks
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .push_back(bytes.into());
        Ok(())
    }

    /// Files saved so far, oldest first.
    pub fn saved_files(&self) -> Result<Vec<SavedFile>, StorageError> {
        Ok(self
            .inner
            .saved
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .clone())
    }

    /// Make every write fail, simulating a full or locked store.
    pub fn set_read_only(&self, read_only: bool) {
        self.inner.read_only.store(read_only, Ordering::Relaxed);
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.inner.read_only.load(Ordering::Relaxed) {
            return Err(StorageError::Internal("storage is read-only".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .inner
            .values
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        self.inner
            .values
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        self.inner
            .values
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .remove(key);
        Ok(())
    }
}

#[async_trait]
impl FileExchange for MemoryStorage {
    async fn pick_file_for_read(&self) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self
            .inner
            .picks
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .pop_front())
    }

    async fn save_bytes_as_file(
        &self,
        bytes: &[u8],
        suggested_name: &str,
    ) -> Result<(), StorageError> {
        self.check_writable()?;
        self.inner
            .saved
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .push(SavedFile {
                name: suggested_name.to_string(),
                bytes: bytes.to_vec(),
            });
        Ok(())
    }
}
