use async_trait::async_trait;
use thiserror::Error;

use crate::http::{CachedResponse, FetchRequest};

#[derive(Debug, Error)]
pub enum NetworkError {
    /// No response arrived: connectivity, DNS, TLS, reset.
    #[error("transport failure for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("invalid request for {url}: {message}")]
    InvalidRequest { url: String, message: String },
}

/// Performs a request against the network.
///
/// Any status the server returns, including 4xx/5xx, is a response. Only a
/// request that produced no response at all is an error.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse, NetworkError>;
}
