use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::http::{CachedResponse, RequestKey};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("store data is corrupt: {0}")]
    Corrupt(String),
}

/// Enumerates, opens and deletes named stores.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open the named store, creating it if absent.
    async fn open(&self, name: &str) -> Result<Arc<dyn ResponseCache>, StorageError>;
    /// Open the named store only if it exists. Never creates.
    async fn open_existing(
        &self,
        name: &str,
    ) -> Result<Option<Arc<dyn ResponseCache>>, StorageError>;
    async fn has(&self, name: &str) -> Result<bool, StorageError>;
    /// Store names in creation order.
    async fn keys(&self) -> Result<Vec<String>, StorageError>;
    /// Returns whether a store with that name existed.
    async fn delete(&self, name: &str) -> Result<bool, StorageError>;
}

/// A single named store. Inserting an existing key replaces its entry.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn lookup(&self, key: &RequestKey) -> Result<Option<CachedResponse>, StorageError>;
    async fn put(&self, key: RequestKey, response: CachedResponse) -> Result<(), StorageError>;
    /// Insert a batch: either every entry becomes visible or none does.
    async fn put_all(
        &self,
        entries: Vec<(RequestKey, CachedResponse)>,
    ) -> Result<(), StorageError>;
    async fn keys(&self) -> Result<Vec<RequestKey>, StorageError>;
    async fn remove(&self, key: &RequestKey) -> Result<bool, StorageError>;
}
