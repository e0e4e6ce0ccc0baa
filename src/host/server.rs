// Axum host: every request that reaches the local port is dispatched as a fetch event.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use reqwest::Url;
use tokio::net::TcpListener;
use tracing::{debug, error, warn};

use super::registration::Registration;
use crate::http::FetchRequest;

/// Largest request body forwarded to the network.
pub const MAX_REQUEST_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone)]
struct HostState {
    registration: Arc<Registration>,
    scope: Url,
    /// Configured asset URLs; the only cross-origin targets the host fetches.
    assets: Arc<Vec<Url>>,
}

impl HostState {
    fn allows(&self, url: &Url) -> bool {
        if url.origin() == self.scope.origin() {
            return true;
        }
        let mut bare = url.clone();
        bare.set_fragment(None);
        self.assets.iter().any(|asset| *asset == bare)
    }
}

pub struct CacheProxyServer {
    port: u16,
    registration: Arc<Registration>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl CacheProxyServer {
    /// Start on a random local port. Request paths are resolved against
    /// `scope`; absolute URLs in the path must be on the scope's origin or
    /// be one of `assets`.
    pub async fn start(
        registration: Arc<Registration>,
        scope: Url,
        assets: Vec<Url>,
    ) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let app = Router::new().fallback(intercept).with_state(HostState {
            registration: registration.clone(),
            scope,
            assets: Arc::new(assets),
        });

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Ok(Self {
            port,
            registration,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}/{}", self.port, path.trim_start_matches('/'))
    }

    pub fn registration(&self) -> &Arc<Registration> {
        &self.registration
    }

    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Drop headers that describe the local hop rather than the request.
fn strip_hop_headers(headers: &mut HeaderMap) {
    for name in [
        header::HOST,
        header::CONNECTION,
        header::TRANSFER_ENCODING,
        header::CONTENT_LENGTH,
    ] {
        headers.remove(name);
    }
}

async fn intercept(State(state): State<HostState>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let url = match state.scope.join(path.trim_start_matches('/')) {
        Ok(url) => url,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("bad request path: {}", e)).into_response();
        }
    };

    if !state.allows(&url) {
        warn!("refusing off-scope fetch {}", url);
        return (StatusCode::FORBIDDEN, format!("not in scope: {}", url)).into_response();
    }

    let body = match to_bytes(body, MAX_REQUEST_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            return (StatusCode::PAYLOAD_TOO_LARGE, format!("body rejected: {}", e))
                .into_response();
        }
    };

    let mut headers = parts.headers;
    strip_hop_headers(&mut headers);

    let mut request = FetchRequest::new(parts.method, url).with_body(body);
    request.headers = headers;
    debug!("host fetch method={} url={}", request.method, request.url);

    match state.registration.dispatch_fetch(request).await {
        Ok(resp) => {
            let mut headers = resp.headers;
            strip_hop_headers(&mut headers);
            (resp.status, headers, Body::from(resp.body)).into_response()
        }
        Err(e) => {
            error!("fetch failed: {}", e);
            (StatusCode::BAD_GATEWAY, format!("error: {}", e)).into_response()
        }
    }
}
