use anyhow::{anyhow, Result};
use reqwest::Url;
use serde::Deserialize;

/// Store name prefix; the version tag is appended to it.
pub const CACHE_PREFIX: &str = "golf-rechner-cache";

/// Bump whenever any precached file changes.
pub const CACHE_VERSION: &str = "v2";

/// Scope used when no explicit scope is configured.
pub const DEFAULT_SCOPE: &str = "http://127.0.0.1/";

/// Schemes whose responses are never written to the store.
pub const EXCLUDED_SCHEMES: &[&str] = &["chrome-extension"];

/// Minimum set of resources the application shell needs to render offline.
pub const SHELL_ASSETS: &[&str] = &[
    ".",
    "index.html",
    "streamlit_app.py",
    "manifest.json",
    "icon-192x192.png",
    "icon-512x512.png",
    "icon-maskable-192x192.png",
    "icon-maskable-512x512.png",
    "https://cdn.jsdelivr.net/npm/@stlite/mountable@0.41.0/build/stlite.css",
    "https://cdn.jsdelivr.net/npm/@stlite/mountable@0.41.0/build/stlite.js",
];

/// Configuration for one deployed worker version.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    /// Prefix shared by every version's store name.
    pub cache_prefix: String,
    /// Version tag embedded in the store name.
    pub version: String,
    /// Ordered asset list, relative to `scope` or absolute.
    pub assets: Vec<String>,
    /// Base URL of the controlled application.
    pub scope: String,
    /// URL schemes that are never persisted.
    pub excluded_schemes: Vec<String>,
    /// Directory for the durable store. In-memory when unset.
    pub cache_dir: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_prefix: CACHE_PREFIX.to_string(),
            version: CACHE_VERSION.to_string(),
            assets: SHELL_ASSETS.iter().map(|s| s.to_string()).collect(),
            scope: DEFAULT_SCOPE.to_string(),
            excluded_schemes: EXCLUDED_SCHEMES.iter().map(|s| s.to_string()).collect(),
            cache_dir: None,
        }
    }
}

impl WorkerConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| anyhow!("invalid worker config: {}", e))?;
        if config.version.trim().is_empty() {
            return Err(anyhow!("invalid worker config: version must not be empty"));
        }
        config.scope_url()?;
        Ok(config)
    }

    /// Name of the store owned by this version.
    pub fn cache_name(&self) -> String {
        format!("{}-{}", self.cache_prefix, self.version)
    }

    pub fn scope_url(&self) -> Result<Url> {
        Url::parse(&self.scope).map_err(|e| anyhow!("invalid scope {:?}: {}", self.scope, e))
    }

    /// Resolve every asset against the scope, preserving order.
    pub fn resolve_assets(&self) -> Result<Vec<Url>> {
        let scope = self.scope_url()?;
        self.assets
            .iter()
            .map(|asset| {
                scope
                    .join(asset)
                    .map_err(|e| anyhow!("invalid asset url {:?}: {}", asset, e))
            })
            .collect()
    }
}
