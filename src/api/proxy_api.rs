use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::WorkerConfig;
use crate::host::{CacheProxyServer, RegisterOutcome, Registration};
use crate::network::HttpNetwork;
use crate::storage::{CacheStorage, DiskStorage, MemoryStorage};

/// A running offline proxy: registration plus its local HTTP host.
pub struct OfflineProxy {
    server: CacheProxyServer,
    outcome: RegisterOutcome,
}

impl OfflineProxy {
    /// Build the stack for `config`, install and activate its version, and
    /// start serving on a random local port.
    pub async fn start(config: WorkerConfig) -> Result<Self> {
        super::simple::init_tracing();

        let storage: Arc<dyn CacheStorage> = match &config.cache_dir {
            Some(dir) => Arc::new(DiskStorage::open_dir(dir).await?),
            None => Arc::new(MemoryStorage::new()),
        };
        let network = Arc::new(HttpNetwork::new()?);
        let scope = config.scope_url()?;
        let assets = config.resolve_assets()?;

        let registration = Arc::new(Registration::new(storage, network));
        let outcome = registration.register(config).await?;
        let server = CacheProxyServer::start(registration, scope, assets).await?;
        info!("offline proxy listening on port {}", server.port());

        Ok(Self { server, outcome })
    }

    pub fn port(&self) -> u16 {
        self.server.port()
    }

    pub fn url_for(&self, path: &str) -> String {
        self.server.url_for(path)
    }

    pub fn registration(&self) -> &Arc<Registration> {
        self.server.registration()
    }

    /// Install/activate reports of the startup version.
    pub fn outcome(&self) -> &RegisterOutcome {
        &self.outcome
    }

    /// Finish pending store writes, then stop the server.
    pub async fn shutdown(self) {
        self.server.registration().flush().await;
        self.server.shutdown();
    }
}
