// Registration: drives worker versions through install/activate and routes fetches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::engine::{
    ActivateReport, CacheWorker, ClientControl, FetchError, InstallReport, Interception,
    WorkerState,
};
use crate::http::{CachedResponse, FetchRequest};
use crate::network::Network;
use crate::storage::CacheStorage;

pub type ClientId = u64;

/// Open client contexts and the version controlling each.
#[derive(Default)]
pub struct ClientRegistry {
    next_id: AtomicU64,
    clients: RwLock<HashMap<ClientId, Option<String>>>,
}

impl ClientRegistry {
    fn open(&self, controller: Option<String>) -> ClientId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.clients.write().insert(id, controller);
        id
    }

    fn close(&self, id: ClientId) -> bool {
        self.clients.write().remove(&id).is_some()
    }

    fn controller(&self, id: ClientId) -> Option<String> {
        self.clients.read().get(&id).cloned().flatten()
    }

    fn claim_all(&self, version: &str) -> usize {
        let mut clients = self.clients.write();
        for controller in clients.values_mut() {
            *controller = Some(version.to_string());
        }
        clients.len()
    }

    fn controlled_by(&self, version: &str) -> usize {
        self.clients
            .read()
            .values()
            .filter(|c| c.as_deref() == Some(version))
            .count()
    }
}

/// Per-worker handle the host gives to `CacheWorker` as its `ClientControl`.
struct HostControl {
    version: String,
    skip_waiting: AtomicBool,
    clients: Arc<ClientRegistry>,
}

impl ClientControl for HostControl {
    fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::Release);
    }

    fn claim(&self) {
        let count = self.clients.claim_all(&self.version);
        debug!("version {} claimed {} clients", self.version, count);
    }
}

#[derive(Default)]
struct Slots {
    active: Option<Arc<CacheWorker>>,
    waiting: Option<Arc<CacheWorker>>,
    /// Superseded workers whose store still exists.
    retired: Vec<Arc<CacheWorker>>,
}

/// Result of registering one version.
#[derive(Debug, Clone)]
pub struct RegisterOutcome {
    pub install: InstallReport,
    /// Present when the version was activated right away.
    pub activate: Option<ActivateReport>,
}

pub struct Registration {
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    clients: Arc<ClientRegistry>,
    slots: RwLock<Slots>,
}

impl Registration {
    pub fn new(storage: Arc<dyn CacheStorage>, network: Arc<dyn Network>) -> Self {
        Self {
            storage,
            network,
            clients: Arc::new(ClientRegistry::default()),
            slots: RwLock::new(Slots::default()),
        }
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    /// Install a version and activate it when it asks to skip waiting or
    /// when nothing is active yet.
    pub async fn register(&self, config: WorkerConfig) -> Result<RegisterOutcome> {
        config.scope_url()?;
        let control = Arc::new(HostControl {
            version: config.version.clone(),
            skip_waiting: AtomicBool::new(false),
            clients: self.clients.clone(),
        });
        let worker = Arc::new(CacheWorker::new(
            config,
            self.storage.clone(),
            self.network.clone(),
            control.clone(),
        ));

        let install = worker.on_install().await;

        let replaced = self.slots.write().waiting.replace(worker.clone());
        if let Some(replaced) = replaced {
            if let Err(e) = replaced.transition(WorkerState::Terminated) {
                warn!("replaced waiting worker: {}", e);
            }
        }

        let has_active = self.slots.read().active.is_some();
        let activate = if control.skip_waiting.load(Ordering::Acquire) || !has_active {
            self.activate_waiting().await
        } else {
            info!("version {} installed and waiting", worker.version());
            None
        };

        Ok(RegisterOutcome { install, activate })
    }

    /// Promote the waiting worker, if any.
    pub async fn activate_waiting(&self) -> Option<ActivateReport> {
        let next = self.slots.write().waiting.take()?;

        // Settle the outgoing version's writes before its store is deleted;
        // once retired, a late write cannot bring the store back.
        if let Some(outgoing) = self.active() {
            outgoing.retire();
            outgoing.flush_writes().await;
        }
        let report = next.on_activate().await;

        let previous = self.slots.write().active.replace(next.clone());
        if let Some(previous) = previous {
            if let Err(e) = previous.transition(WorkerState::Superseded) {
                warn!("superseding {}: {}", previous.cache_name(), e);
            }
            self.slots.write().retired.push(previous);
        }
        self.reap_retired().await;

        info!("version {} active cache={}", next.version(), next.cache_name());
        Some(report)
    }

    /// Terminate retired workers whose store has been deleted.
    async fn reap_retired(&self) {
        let retired = std::mem::take(&mut self.slots.write().retired);
        let mut keep = Vec::new();
        for worker in retired {
            match self.storage.has(worker.cache_name()).await {
                Ok(false) => {
                    if let Err(e) = worker.transition(WorkerState::Terminated) {
                        warn!("terminating {}: {}", worker.cache_name(), e);
                    }
                }
                Ok(true) => keep.push(worker),
                Err(e) => {
                    warn!("store check for {} failed: {}", worker.cache_name(), e);
                    keep.push(worker);
                }
            }
        }
        self.slots.write().retired.extend(keep);
    }

    pub fn active(&self) -> Option<Arc<CacheWorker>> {
        self.slots.read().active.clone()
    }

    pub fn waiting(&self) -> Option<Arc<CacheWorker>> {
        self.slots.read().waiting.clone()
    }

    /// Route a request through the active worker. Pass-through requests and
    /// requests issued while nothing is active go straight to the network.
    pub async fn dispatch_fetch(&self, request: FetchRequest) -> Result<CachedResponse, FetchError> {
        let Some(worker) = self.active() else {
            return Ok(self.network.fetch(&request).await?);
        };
        match worker.on_fetch(request).await? {
            Interception::PassThrough(request) => Ok(self.network.fetch(&request).await?),
            Interception::Cached(resp) | Interception::Network(resp) => Ok(resp),
        }
    }

    /// Open a client; it is controlled by the active version, if any.
    pub fn open_client(&self) -> ClientId {
        let controller = self.active().map(|w| w.version().to_string());
        self.clients.open(controller)
    }

    pub fn close_client(&self, id: ClientId) -> bool {
        self.clients.close(id)
    }

    pub fn controller_of(&self, id: ClientId) -> Option<String> {
        self.clients.controller(id)
    }

    pub fn controlled_clients(&self, version: &str) -> usize {
        self.clients.controlled_by(version)
    }

    /// Wait for pending store writes of the active and retired workers.
    pub async fn flush(&self) {
        let workers: Vec<Arc<CacheWorker>> = {
            let slots = self.slots.read();
            slots.active.iter().chain(slots.retired.iter()).cloned().collect()
        };
        for worker in workers {
            worker.flush_writes().await;
        }
    }
}
