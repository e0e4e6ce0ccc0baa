// Process-local store backend.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::traits::{CacheStorage, ResponseCache, StorageError};
use crate::http::{CachedResponse, RequestKey};

#[derive(Default)]
pub struct MemoryStorage {
    // Vec keeps creation order for `keys()`.
    stores: RwLock<Vec<(String, Arc<MemoryCache>)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn ResponseCache>, StorageError> {
        if let Some((_, cache)) = self.stores.read().iter().find(|(n, _)| n == name) {
            return Ok(cache.clone());
        }
        let mut stores = self.stores.write();
        // Re-check: another opener may have won the race.
        if let Some((_, cache)) = stores.iter().find(|(n, _)| n == name) {
            return Ok(cache.clone());
        }
        let cache = Arc::new(MemoryCache::default());
        stores.push((name.to_string(), cache.clone()));
        Ok(cache)
    }

    async fn open_existing(
        &self,
        name: &str,
    ) -> Result<Option<Arc<dyn ResponseCache>>, StorageError> {
        Ok(self
            .stores
            .read()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, cache)| cache.clone() as Arc<dyn ResponseCache>))
    }

    async fn has(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.stores.read().iter().any(|(n, _)| n == name))
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.stores.read().iter().map(|(n, _)| n.clone()).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let mut stores = self.stores.write();
        let before = stores.len();
        stores.retain(|(n, _)| n != name);
        Ok(stores.len() != before)
    }
}

#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<Vec<(RequestKey, CachedResponse)>>,
}

impl MemoryCache {
    fn insert(entries: &mut Vec<(RequestKey, CachedResponse)>, key: RequestKey, resp: CachedResponse) {
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = resp,
            None => entries.push((key, resp)),
        }
    }
}

#[async_trait]
impl ResponseCache for MemoryCache {
    async fn lookup(&self, key: &RequestKey) -> Result<Option<CachedResponse>, StorageError> {
        Ok(self
            .entries
            .read()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, r)| r.clone()))
    }

    async fn put(&self, key: RequestKey, response: CachedResponse) -> Result<(), StorageError> {
        Self::insert(&mut self.entries.write(), key, response);
        Ok(())
    }

    async fn put_all(
        &self,
        batch: Vec<(RequestKey, CachedResponse)>,
    ) -> Result<(), StorageError> {
        // A single write guard makes the whole batch visible at once.
        let mut entries = self.entries.write();
        for (key, resp) in batch {
            Self::insert(&mut entries, key, resp);
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<RequestKey>, StorageError> {
        Ok(self.entries.read().iter().map(|(k, _)| k.clone()).collect())
    }

    async fn remove(&self, key: &RequestKey) -> Result<bool, StorageError> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(k, _)| k != key);
        Ok(entries.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use reqwest::Url;

    fn entry(path: &str, body: &'static str) -> (RequestKey, CachedResponse) {
        let url = Url::parse("https://calc.example/").unwrap().join(path).unwrap();
        (
            RequestKey::get(&url),
            CachedResponse::new(StatusCode::OK, url, body),
        )
    }

    #[tokio::test]
    async fn test_open_is_create_if_absent() {
        let storage = MemoryStorage::new();
        assert!(!storage.has("a").await.unwrap());

        let a = storage.open("a").await.unwrap();
        let (key, resp) = entry("index.html", "shell");
        a.put(key.clone(), resp).await.unwrap();

        // Reopening returns the same store.
        let again = storage.open("a").await.unwrap();
        assert!(again.lookup(&key).await.unwrap().is_some());
        assert_eq!(storage.keys().await.unwrap(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_put_replaces_existing_key() {
        let storage = MemoryStorage::new();
        let cache = storage.open("a").await.unwrap();
        let (key, first) = entry("index.html", "one");
        let (_, second) = entry("index.html", "two");
        cache.put(key.clone(), first).await.unwrap();
        cache.put(key.clone(), second).await.unwrap();

        assert_eq!(cache.keys().await.unwrap().len(), 1);
        assert_eq!(&cache.lookup(&key).await.unwrap().unwrap().body[..], b"two");
    }

    #[tokio::test]
    async fn test_delete_store() {
        let storage = MemoryStorage::new();
        storage.open("old").await.unwrap();
        storage.open("new").await.unwrap();
        assert!(storage.delete("old").await.unwrap());
        assert!(!storage.delete("old").await.unwrap());
        assert_eq!(storage.keys().await.unwrap(), vec!["new".to_string()]);
    }

    #[tokio::test]
    async fn test_open_existing_does_not_create() {
        let storage = MemoryStorage::new();
        assert!(storage.open_existing("gone").await.unwrap().is_none());
        assert!(!storage.has("gone").await.unwrap());

        storage.open("kept").await.unwrap();
        assert!(storage.open_existing("kept").await.unwrap().is_some());
    }
}
