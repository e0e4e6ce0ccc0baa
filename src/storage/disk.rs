// Durable store backend: a JSON manifest of store names plus one directory per store.
//
// Layout:
//   <root>/stores.json          store name -> directory
//   <root>/store-<n>/index.json entry index
//   <root>/store-<n>/body-<m>   one body file per entry
//
// Index files are replaced by write-to-temp + rename, so a batch insert is
// committed by a single rename.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use parking_lot::Mutex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use super::traits::{CacheStorage, ResponseCache, StorageError};
use crate::http::{CachedResponse, RequestKey};

const MANIFEST_FILE: &str = "stores.json";
const INDEX_FILE: &str = "index.json";

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoreManifest {
    stores: Vec<StoreRecord>,
    next_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreRecord {
    name: String,
    dir: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct EntryIndex {
    entries: Vec<EntryRecord>,
    next_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryRecord {
    key: RequestKey,
    status: u16,
    /// Raw value bytes; header values need not be visible ASCII.
    headers: Vec<(String, Vec<u8>)>,
    url: String,
    body: String,
}

async fn read_json<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> Result<T, StorageError> {
    match fs::read(path).await {
        Ok(raw) => Ok(serde_json::from_slice(&raw)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let raw = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &raw).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

pub struct DiskStorage {
    root: PathBuf,
    manifest: tokio::sync::Mutex<StoreManifest>,
    handles: Mutex<HashMap<String, Arc<DiskCache>>>,
}

impl DiskStorage {
    /// Open (or initialise) the storage rooted at `root`.
    pub async fn open_dir(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        let manifest: StoreManifest = read_json(&root.join(MANIFEST_FILE)).await?;
        debug!(
            "disk storage opened root={} stores={}",
            root.display(),
            manifest.stores.len()
        );
        Ok(Self {
            root,
            manifest: tokio::sync::Mutex::new(manifest),
            handles: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Callers hold the manifest lock, so no other opener loads the same store.
    async fn load_handle(
        &self,
        name: &str,
        dir: PathBuf,
    ) -> Result<Arc<dyn ResponseCache>, StorageError> {
        let loaded = Arc::new(DiskCache::load(dir).await?);
        let handle = self
            .handles
            .lock()
            .entry(name.to_string())
            .or_insert(loaded)
            .clone();
        Ok(handle as Arc<dyn ResponseCache>)
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn ResponseCache>, StorageError> {
        let cached = self.handles.lock().get(name).cloned();
        if let Some(handle) = cached {
            return Ok(handle as Arc<dyn ResponseCache>);
        }

        let mut manifest = self.manifest.lock().await;
        let dir = match manifest.stores.iter().find(|s| s.name == name) {
            Some(record) => self.root.join(&record.dir),
            None => {
                let dir_name = format!("store-{}", manifest.next_id);
                let mut updated = manifest.clone();
                updated.next_id += 1;
                updated.stores.push(StoreRecord {
                    name: name.to_string(),
                    dir: dir_name.clone(),
                });
                fs::create_dir_all(self.root.join(&dir_name)).await?;
                write_json_atomic(&self.root.join(MANIFEST_FILE), &updated).await?;
                *manifest = updated;
                debug!("disk store created name={} dir={}", name, dir_name);
                self.root.join(dir_name)
            }
        };
        self.load_handle(name, dir).await
    }

    async fn open_existing(
        &self,
        name: &str,
    ) -> Result<Option<Arc<dyn ResponseCache>>, StorageError> {
        let cached = self.handles.lock().get(name).cloned();
        if let Some(handle) = cached {
            return Ok(Some(handle as Arc<dyn ResponseCache>));
        }

        let manifest = self.manifest.lock().await;
        let Some(record) = manifest.stores.iter().find(|s| s.name == name) else {
            return Ok(None);
        };
        let dir = self.root.join(&record.dir);
        Ok(Some(self.load_handle(name, dir).await?))
    }

    async fn has(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.manifest.lock().await.stores.iter().any(|s| s.name == name))
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self
            .manifest
            .lock()
            .await
            .stores
            .iter()
            .map(|s| s.name.clone())
            .collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let mut manifest = self.manifest.lock().await;
        let Some(record) = manifest.stores.iter().find(|s| s.name == name).cloned() else {
            return Ok(false);
        };

        let mut updated = manifest.clone();
        updated.stores.retain(|s| s.name != name);
        write_json_atomic(&self.root.join(MANIFEST_FILE), &updated).await?;
        *manifest = updated;
        self.handles.lock().remove(name);

        // The store is already gone from the manifest; leftover files are harmless.
        if let Err(e) = fs::remove_dir_all(self.root.join(&record.dir)).await {
            warn!("failed to remove store dir {}: {}", record.dir, e);
        }
        debug!("disk store deleted name={}", name);
        Ok(true)
    }
}

pub struct DiskCache {
    dir: PathBuf,
    index: tokio::sync::Mutex<EntryIndex>,
}

impl DiskCache {
    async fn load(dir: PathBuf) -> Result<Self, StorageError> {
        let index: EntryIndex = read_json(&dir.join(INDEX_FILE)).await?;
        Ok(Self {
            dir,
            index: tokio::sync::Mutex::new(index),
        })
    }

    fn encode(key: RequestKey, resp: &CachedResponse, body: String) -> EntryRecord {
        let headers = resp
            .headers
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
            .collect();
        EntryRecord {
            key,
            status: resp.status.as_u16(),
            headers,
            url: resp.url.to_string(),
            body,
        }
    }

    async fn decode(&self, record: &EntryRecord) -> Result<CachedResponse, StorageError> {
        let status = StatusCode::from_u16(record.status)
            .map_err(|_| StorageError::Corrupt(format!("bad status {}", record.status)))?;
        let url = Url::parse(&record.url)
            .map_err(|e| StorageError::Corrupt(format!("bad url {}: {}", record.url, e)))?;
        let mut headers = HeaderMap::new();
        for (name, value) in &record.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| StorageError::Corrupt(format!("bad header name {}", name)))?;
            let value = HeaderValue::from_bytes(value)
                .map_err(|_| StorageError::Corrupt(format!("bad header value for {}", name)))?;
            headers.append(name, value);
        }
        let body = fs::read(self.dir.join(&record.body)).await?;
        Ok(CachedResponse {
            status,
            headers,
            body: Bytes::from(body),
            url,
        })
    }

    /// Write bodies, then swap the index in one rename.
    async fn commit(&self, batch: Vec<(RequestKey, CachedResponse)>) -> Result<(), StorageError> {
        let mut index = self.index.lock().await;
        let mut updated = index.clone();
        let mut written = Vec::with_capacity(batch.len());
        let mut replaced = Vec::new();

        let result: Result<(), StorageError> = async {
            for (key, resp) in batch {
                let body_name = format!("body-{}", updated.next_id);
                updated.next_id += 1;
                fs::write(self.dir.join(&body_name), &resp.body).await?;
                written.push(body_name.clone());

                let record = Self::encode(key, &resp, body_name);
                match updated.entries.iter_mut().find(|e| e.key == record.key) {
                    Some(slot) => {
                        let old = std::mem::replace(slot, record);
                        replaced.push(old.body);
                    }
                    None => updated.entries.push(record),
                }
            }
            write_json_atomic(&self.dir.join(INDEX_FILE), &updated).await
        }
        .await;

        match result {
            Ok(()) => {
                *index = updated;
                for body in replaced {
                    let _ = fs::remove_file(self.dir.join(body)).await;
                }
                Ok(())
            }
            Err(e) => {
                for body in written {
                    let _ = fs::remove_file(self.dir.join(body)).await;
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl ResponseCache for DiskCache {
    async fn lookup(&self, key: &RequestKey) -> Result<Option<CachedResponse>, StorageError> {
        let index = self.index.lock().await;
        match index.entries.iter().find(|e| &e.key == key) {
            Some(record) => Ok(Some(self.decode(record).await?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: RequestKey, response: CachedResponse) -> Result<(), StorageError> {
        self.commit(vec![(key, response)]).await
    }

    async fn put_all(
        &self,
        entries: Vec<(RequestKey, CachedResponse)>,
    ) -> Result<(), StorageError> {
        self.commit(entries).await
    }

    async fn keys(&self) -> Result<Vec<RequestKey>, StorageError> {
        Ok(self
            .index
            .lock()
            .await
            .entries
            .iter()
            .map(|e| e.key.clone())
            .collect())
    }

    async fn remove(&self, key: &RequestKey) -> Result<bool, StorageError> {
        let mut index = self.index.lock().await;
        let Some(pos) = index.entries.iter().position(|e| &e.key == key) else {
            return Ok(false);
        };
        let mut updated = index.clone();
        let removed = updated.entries.remove(pos);
        write_json_atomic(&self.dir.join(INDEX_FILE), &updated).await?;
        *index = updated;
        let _ = fs::remove_file(self.dir.join(removed.body)).await;
        Ok(true)
    }
}
