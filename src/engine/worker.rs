// Cache worker: one deployed version of the cache-first policy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use super::lifecycle::{LifecycleError, WorkerState};
use super::stats::{StatsCollector, StatsSnapshot};
use crate::config::WorkerConfig;
use crate::network::Network;
use crate::storage::CacheStorage;

/// Host hooks for taking control of clients.
pub trait ClientControl: Send + Sync {
    /// Ask the host to activate this version without a waiting phase.
    fn skip_waiting(&self);
    /// Take control of every open client without a reload.
    fn claim(&self);
}

/// Records the requests instead of acting on them. Used when the worker
/// runs outside a host.
#[derive(Debug, Default)]
pub struct ClientFlags {
    skip_waiting: AtomicBool,
    claimed: AtomicBool,
}

impl ClientFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::Acquire)
    }

    pub fn claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }
}

impl ClientControl for ClientFlags {
    fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::Release);
    }

    fn claim(&self) {
        self.claimed.store(true, Ordering::Release);
    }
}

pub struct CacheWorker {
    pub(super) config: WorkerConfig,
    pub(super) cache_name: String,
    pub(super) storage: Arc<dyn CacheStorage>,
    pub(super) network: Arc<dyn Network>,
    pub(super) clients: Arc<dyn ClientControl>,
    pub(super) stats: Arc<StatsCollector>,
    pub(super) writes: TaskTracker,
    /// Set once a newer version is about to take over. A retired worker
    /// never creates its store again.
    pub(super) retired: Arc<AtomicBool>,
    state: Mutex<WorkerState>,
}

impl CacheWorker {
    pub fn new(
        config: WorkerConfig,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
        clients: Arc<dyn ClientControl>,
    ) -> Self {
        let cache_name = config.cache_name();
        debug!("worker created cache={}", cache_name);
        Self {
            config,
            cache_name,
            storage,
            network,
            clients,
            stats: Arc::new(StatsCollector::new()),
            writes: TaskTracker::new(),
            retired: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(WorkerState::Installing),
        }
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn transition(&self, next: WorkerState) -> Result<(), LifecycleError> {
        let mut state = self.state.lock();
        let from = *state;
        *state = from.advance(next)?;
        debug!("worker {} {} -> {}", self.cache_name, from, next);
        Ok(())
    }

    /// Advance only if currently in `from`. Returns whether it moved.
    pub(super) fn advance_from(&self, from: WorkerState, next: WorkerState) -> bool {
        let mut state = self.state.lock();
        if *state != from {
            return false;
        }
        match from.advance(next) {
            Ok(advanced) => {
                *state = advanced;
                debug!("worker {} {} -> {}", self.cache_name, from, next);
                true
            }
            Err(e) => {
                warn!("worker {}: {}", self.cache_name, e);
                false
            }
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop creating this version's store. Lookups and writes still use the
    /// store while it exists.
    pub fn retire(&self) {
        if !self.retired.swap(true, Ordering::AcqRel) {
            debug!("worker {} retired", self.cache_name);
        }
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Wait for every best-effort store write issued so far.
    pub async fn flush_writes(&self) {
        self.writes.close();
        self.writes.wait().await;
        self.writes.reopen();
    }
}
