// Shared fakes for the worker and registration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use parking_lot::Mutex;
use reqwest::Url;

use pwa_cache_engine::config::WorkerConfig;
use pwa_cache_engine::http::{CachedResponse, FetchRequest, RequestKey};
use pwa_cache_engine::network::{Network, NetworkError};
use pwa_cache_engine::storage::{CacheStorage, MemoryStorage, ResponseCache, StorageError};

pub const SCOPE: &str = "https://calc.example/app/";
pub const CDN_SCRIPT: &str = "https://cdn.example/stlite@0.41.0/stlite.js";

/// In-process network with a per-URL call log. Unrouted URLs fail like an
/// unreachable host.
#[derive(Default)]
pub struct FakeNetwork {
    routes: Mutex<HashMap<String, (StatusCode, Bytes)>>,
    calls: Mutex<Vec<String>>,
    offline: AtomicBool,
}

impl FakeNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, url: &str, status: StatusCode, body: &str) {
        self.routes
            .lock()
            .insert(url.to_string(), (status, Bytes::copy_from_slice(body.as_bytes())));
    }

    pub fn unroute(&self, url: &str) {
        self.routes.lock().remove(url);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse, NetworkError> {
        let url = request.url.to_string();
        self.calls.lock().push(url.clone());
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::Transport {
                url,
                message: "offline".to_string(),
            });
        }
        let route = self.routes.lock().get(&url).cloned();
        match route {
            Some((status, body)) => Ok(CachedResponse::new(status, request.url.clone(), body)),
            None => Err(NetworkError::Transport {
                url,
                message: "connection refused".to_string(),
            }),
        }
    }
}

/// Shell config with a short asset list under `SCOPE`.
pub fn shell_config(version: &str) -> WorkerConfig {
    WorkerConfig {
        version: version.to_string(),
        assets: vec![
            ".".to_string(),
            "index.html".to_string(),
            "manifest.json".to_string(),
            CDN_SCRIPT.to_string(),
        ],
        scope: SCOPE.to_string(),
        ..WorkerConfig::default()
    }
}

/// Absolute URLs of `shell_config`'s assets.
pub fn shell_urls() -> Vec<String> {
    vec![
        SCOPE.to_string(),
        format!("{}index.html", SCOPE),
        format!("{}manifest.json", SCOPE),
        CDN_SCRIPT.to_string(),
    ]
}

pub fn route_shell(network: &FakeNetwork) {
    for url in shell_urls() {
        network.route(&url, StatusCode::OK, &format!("asset {}", url));
    }
}

pub fn get(url: &str) -> FetchRequest {
    FetchRequest::get(Url::parse(url).unwrap())
}

pub fn key(url: &str) -> RequestKey {
    RequestKey::get(&Url::parse(url).unwrap())
}

/// Memory storage that can be told to fail writes or refuse deleting stores.
#[derive(Default)]
pub struct FlakyStorage {
    inner: MemoryStorage,
    fail_writes: Arc<AtomicBool>,
    undeletable: Mutex<Vec<String>>,
}

impl FlakyStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn protect(&self, name: &str) {
        self.undeletable.lock().push(name.to_string());
    }

    pub fn unprotect(&self, name: &str) {
        self.undeletable.lock().retain(|n| n != name);
    }
}

#[async_trait]
impl CacheStorage for FlakyStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn ResponseCache>, StorageError> {
        let inner = self.inner.open(name).await?;
        Ok(Arc::new(FlakyCache {
            inner,
            fail_writes: self.fail_writes.clone(),
        }))
    }

    async fn open_existing(
        &self,
        name: &str,
    ) -> Result<Option<Arc<dyn ResponseCache>>, StorageError> {
        let Some(inner) = self.inner.open_existing(name).await? else {
            return Ok(None);
        };
        let cache: Arc<dyn ResponseCache> = Arc::new(FlakyCache {
            inner,
            fail_writes: self.fail_writes.clone(),
        });
        Ok(Some(cache))
    }

    async fn has(&self, name: &str) -> Result<bool, StorageError> {
        self.inner.has(name).await
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.inner.keys().await
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let protected = self.undeletable.lock().iter().any(|n| n == name);
        if protected {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "store is locked",
            )));
        }
        self.inner.delete(name).await
    }
}

struct FlakyCache {
    inner: Arc<dyn ResponseCache>,
    fail_writes: Arc<AtomicBool>,
}

impl FlakyCache {
    fn check_write(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "quota exceeded",
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ResponseCache for FlakyCache {
    async fn lookup(&self, key: &RequestKey) -> Result<Option<CachedResponse>, StorageError> {
        self.inner.lookup(key).await
    }

    async fn put(&self, key: RequestKey, response: CachedResponse) -> Result<(), StorageError> {
        self.check_write()?;
        self.inner.put(key, response).await
    }

    async fn put_all(
        &self,
        entries: Vec<(RequestKey, CachedResponse)>,
    ) -> Result<(), StorageError> {
        self.check_write()?;
        self.inner.put_all(entries).await
    }

    async fn keys(&self) -> Result<Vec<RequestKey>, StorageError> {
        self.inner.keys().await
    }

    async fn remove(&self, key: &RequestKey) -> Result<bool, StorageError> {
        self.inner.remove(key).await
    }
}
