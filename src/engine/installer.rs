// Install handler: precache the shell asset list as one all-or-nothing batch.

use anyhow::{anyhow, Result};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use super::lifecycle::WorkerState;
use super::worker::CacheWorker;
use crate::http::{CachedResponse, FetchRequest, RequestKey};

/// Outcome of one install attempt. Install itself never fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub cache_name: String,
    /// Number of assets written; either the full list or zero.
    pub precached: usize,
    pub error: Option<String>,
}

impl InstallReport {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

impl CacheWorker {
    /// Handle the host's `install` event.
    ///
    /// Requests immediate activation, then fetches every asset and commits
    /// them to this version's store in one batch. A failing asset leaves the
    /// store without any of the batch; the failure is logged and the report
    /// says so, but install still completes.
    pub async fn on_install(&self) -> InstallReport {
        self.clients.skip_waiting();

        let result = self.precache().await;
        self.advance_from(WorkerState::Installing, WorkerState::Waiting);

        match result {
            Ok(precached) => {
                info!(
                    "install complete cache={} precached={}",
                    self.cache_name, precached
                );
                InstallReport {
                    cache_name: self.cache_name.clone(),
                    precached,
                    error: None,
                }
            }
            Err(e) => {
                error!("failed to cache urls cache={}: {:#}", self.cache_name, e);
                InstallReport {
                    cache_name: self.cache_name.clone(),
                    precached: 0,
                    error: Some(format!("{:#}", e)),
                }
            }
        }
    }

    async fn precache(&self) -> Result<usize> {
        let urls = self.config.resolve_assets()?;
        let cache = self.storage.open(&self.cache_name).await?;
        debug!(
            "opened cache {} and caching {} urls",
            self.cache_name,
            urls.len()
        );

        let mut tasks = JoinSet::new();
        for (position, url) in urls.into_iter().enumerate() {
            let network = self.network.clone();
            tasks.spawn(async move {
                let request = FetchRequest::get(url);
                let response = network.fetch(&request).await?;
                if !response.is_ok() {
                    return Err(anyhow!(
                        "{} returned HTTP {}",
                        request.url,
                        response.status.as_u16()
                    ));
                }
                Ok::<(usize, RequestKey, CachedResponse), anyhow::Error>((
                    position,
                    request.key(),
                    response,
                ))
            });
        }

        let mut fetched = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            // Returning drops the JoinSet, which aborts the remaining fetches.
            let entry = joined.map_err(|e| anyhow!("asset task failed: {}", e))??;
            fetched.push(entry);
        }
        fetched.sort_by_key(|(position, _, _)| *position);

        let batch: Vec<(RequestKey, CachedResponse)> = fetched
            .into_iter()
            .map(|(_, key, response)| (key, response))
            .collect();
        let count = batch.len();
        cache.put_all(batch).await?;
        Ok(count)
    }
}
