//! Persistence collaborator traits.

use async_trait::async_trait;
use thiserror::Error;

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Key/value store holding the autosave snapshot.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value; `None` if the key was never written.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a value. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// User-facing file exchange (save and open dialogs).
#[async_trait]
pub trait FileExchange: Send + Sync {
    /// Ask the user for a file to read; `None` if they cancelled.
    async fn pick_file_for_read(&self) -> Result<Option<Vec<u8>>, StorageError>;

    /// Hand a payload to the user as a file with the suggested name.
    async fn save_bytes_as_file(&self, bytes: &[u8], suggested_name: &str)
    -> Result<(), StorageError>;
}
