use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::traits::{Network, NetworkError};
use crate::http::{CachedResponse, FetchRequest};

/// Request timeout applied to every network fetch.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    pub fn new() -> Result<Self, NetworkError> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| NetworkError::InvalidRequest {
                url: String::new(),
                message: format!("client init failed: {}", e),
            })?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse, NetworkError> {
        let url = request.url.to_string();
        match request.url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(NetworkError::InvalidRequest {
                    url,
                    message: format!("unsupported scheme {}", other),
                })
            }
        }

        let mut req = self
            .client
            .request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            req = req.header(name, value);
        }
        if !request.body.is_empty() {
            req = req.body(request.body.clone());
        }

        let resp = req.send().await.map_err(|e| NetworkError::Transport {
            url: url.clone(),
            message: e.to_string(),
        })?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let final_url = resp.url().clone();
        debug!(
            "network fetch method={} url={} status={}",
            request.method,
            url,
            status.as_u16()
        );

        let body = resp.bytes().await.map_err(|e| NetworkError::Transport {
            url: url.clone(),
            message: format!("body read failed: {}", e),
        })?;

        Ok(CachedResponse {
            status,
            headers,
            body,
            url: final_url,
        })
    }
}
