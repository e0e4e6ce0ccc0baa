// Fetch handler: cache-first, network fallback, best-effort write-through.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use http::StatusCode;
use thiserror::Error;
use tracing::{debug, warn};

use super::worker::CacheWorker;
use crate::http::{scheme_excluded, CachedResponse, FetchRequest, RequestKey};
use crate::network::NetworkError;
use crate::storage::{CacheStorage, ResponseCache, StorageError};

#[derive(Debug, Error)]
pub enum FetchError {
    /// Neither the store nor the network could answer. No fallback content
    /// is substituted.
    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// How the worker answered a request.
#[derive(Debug)]
pub enum Interception {
    /// Not intercepted. The host sends the request unmodified.
    PassThrough(FetchRequest),
    /// Served from the store; the network was not touched.
    Cached(CachedResponse),
    /// Served from the network after a store miss.
    Network(CachedResponse),
}

impl Interception {
    /// The response, if the worker produced one.
    pub fn into_response(self) -> Option<CachedResponse> {
        match self {
            Interception::PassThrough(_) => None,
            Interception::Cached(resp) | Interception::Network(resp) => Some(resp),
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Interception::Cached(_))
    }
}

impl CacheWorker {
    /// Handle one `fetch` event.
    pub async fn on_fetch(&self, request: FetchRequest) -> Result<Interception, FetchError> {
        if !request.is_get() {
            self.stats.record_pass_through();
            debug!("pass-through method={} url={}", request.method, request.url);
            return Ok(Interception::PassThrough(request));
        }

        let key = request.key();
        if let Some(resp) = self.lookup(&key).await {
            self.stats.record_hit();
            debug!("cache hit {}", key);
            return Ok(Interception::Cached(resp));
        }
        self.stats.record_miss();

        let response = match self.network.fetch(&request).await {
            Ok(resp) => {
                self.stats.record_network(true);
                resp
            }
            Err(e) => {
                self.stats.record_network(false);
                warn!("fetch failed, no offline fallback for {}: {}", request.url, e);
                return Err(e.into());
            }
        };

        if !self.is_storable(&request, &response) {
            debug!(
                "not storing {} status={}",
                key,
                response.status.as_u16()
            );
            return Ok(Interception::Network(response));
        }

        let (caller, stored) = response.duplicate();
        self.spawn_store(key, stored);
        Ok(Interception::Network(caller))
    }

    /// Store failures fall through to the network like a miss.
    async fn lookup(&self, key: &RequestKey) -> Option<CachedResponse> {
        let opened = open_store(self.storage.as_ref(), &self.cache_name, &self.retired).await;
        let cache = match opened {
            Ok(Some(cache)) => cache,
            Ok(None) => return None,
            Err(e) => {
                warn!("cache open failed cache={}: {}", self.cache_name, e);
                return None;
            }
        };
        match cache.lookup(key).await {
            Ok(found) => found,
            Err(e) => {
                warn!("cache lookup failed for {}: {}", key, e);
                None
            }
        }
    }

    /// GET, status 200, and not an excluded scheme.
    pub fn is_storable(&self, request: &FetchRequest, response: &CachedResponse) -> bool {
        request.is_get()
            && response.status == StatusCode::OK
            && !scheme_excluded(&request.url, &self.config.excluded_schemes)
    }

    /// Write in the background so the caller never waits on storage.
    fn spawn_store(&self, key: RequestKey, response: CachedResponse) {
        let storage = self.storage.clone();
        let cache_name = self.cache_name.clone();
        let stats = self.stats.clone();
        let retired = self.retired.clone();
        self.writes.spawn(async move {
            let result = match open_store(storage.as_ref(), &cache_name, &retired).await {
                Ok(Some(cache)) => cache.put(key.clone(), response).await,
                Ok(None) => {
                    debug!("store {} is gone, dropping write of {}", cache_name, key);
                    return;
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {
                    stats.record_store(true);
                    debug!("stored {} in {}", key, cache_name);
                }
                Err(e) => {
                    stats.record_store(false);
                    warn!("best-effort store of {} failed: {}", key, e);
                }
            }
        });
    }
}

/// The current version creates its store on demand; a retired one only
/// reuses it while it still exists.
async fn open_store(
    storage: &dyn CacheStorage,
    cache_name: &str,
    retired: &AtomicBool,
) -> Result<Option<Arc<dyn ResponseCache>>, StorageError> {
    if retired.load(Ordering::Acquire) {
        storage.open_existing(cache_name).await
    } else {
        storage.open(cache_name).await.map(Some)
    }
}
