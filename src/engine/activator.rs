// Activate handler: reap stale stores, then claim clients.

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::lifecycle::WorkerState;
use super::worker::CacheWorker;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
    pub deleted: Vec<String>,
    /// Stale stores that could not be removed; the next activation retries them.
    pub failed: Vec<String>,
}

impl CacheWorker {
    /// Handle the host's `activate` event.
    ///
    /// Every store other than this version's is deleted concurrently. Each
    /// deletion stands alone: a failure leaves that store for the next
    /// activation. Clients are claimed once all deletions have settled.
    pub async fn on_activate(&self) -> ActivateReport {
        self.advance_from(WorkerState::Waiting, WorkerState::Activating);

        let mut report = ActivateReport::default();
        let names = match self.storage.keys().await {
            Ok(names) => names,
            Err(e) => {
                warn!("cache enumeration failed: {}", e);
                Vec::new()
            }
        };

        let mut deletions = JoinSet::new();
        for name in names.into_iter().filter(|n| *n != self.cache_name) {
            let storage = self.storage.clone();
            deletions.spawn(async move {
                let result = storage.delete(&name).await;
                (name, result)
            });
        }

        while let Some(joined) = deletions.join_next().await {
            match joined {
                Ok((name, Ok(_))) => {
                    info!("deleted stale cache {}", name);
                    report.deleted.push(name);
                }
                Ok((name, Err(e))) => {
                    debug!("stale cache {} left for next activation: {}", name, e);
                    report.failed.push(name);
                }
                Err(e) => warn!("cache deletion task failed: {}", e),
            }
        }

        self.clients.claim();
        self.advance_from(WorkerState::Activating, WorkerState::Active);
        report
    }
}
