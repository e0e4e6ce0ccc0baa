use std::net::SocketAddr;

use axum::extract::Request;
use axum::http::{header, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use reqwest::Url;
use tokio::net::TcpListener;

use pwa_cache_engine::http::FetchRequest;
use pwa_cache_engine::network::{HttpNetwork, Network, NetworkError};

async fn serve_icon() -> impl IntoResponse {
    let body: Vec<u8> = (0..512).map(|i| (i % 256) as u8).collect();
    (StatusCode::OK, [(header::CONTENT_TYPE, "image/png")], body)
}

async fn echo(req: Request) -> impl IntoResponse {
    let method = req.method().to_string();
    let marker = req
        .headers()
        .get("x-calc")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let body = axum::body::to_bytes(req.into_body(), 1024).await.unwrap();
    format!("{} {} {}", method, marker, String::from_utf8_lossy(&body))
}

async fn start_server() -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let app = Router::new()
        .route("/icon-192x192.png", get(serve_icon))
        .route("/echo", get(echo).post(echo));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, handle)
}

#[tokio::test]
async fn test_http_network_fetch() {
    let (addr, _handle) = start_server().await;
    let network = HttpNetwork::new().unwrap();
    let url = Url::parse(&format!("http://{}/icon-192x192.png", addr)).unwrap();

    let resp = network.fetch(&FetchRequest::get(url.clone())).await.unwrap();
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.headers["content-type"], "image/png");
    assert_eq!(resp.url, url);
    assert_eq!(resp.body.len(), 512);
    for i in 0..100u8 {
        assert_eq!(resp.body[i as usize], i);
    }
}

#[tokio::test]
async fn test_http_network_forwards_method_headers_body() {
    let (addr, _handle) = start_server().await;
    let network = HttpNetwork::new().unwrap();
    let url = Url::parse(&format!("http://{}/echo", addr)).unwrap();

    let mut request = FetchRequest::new(Method::POST, url).with_body("slope=125");
    request.headers.insert("x-calc", "golf".parse().unwrap());
    let resp = network.fetch(&request).await.unwrap();
    assert_eq!(&resp.body[..], b"POST golf slope=125");
}

#[tokio::test]
async fn test_http_network_error_status_is_a_response() {
    let (addr, _handle) = start_server().await;
    let network = HttpNetwork::new().unwrap();
    let url = Url::parse(&format!("http://{}/nope", addr)).unwrap();

    let resp = network.fetch(&FetchRequest::get(url)).await.unwrap();
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_http_network_unreachable_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let network = HttpNetwork::new().unwrap();
    let url = Url::parse(&format!("http://{}/index.html", addr)).unwrap();
    let err = network.fetch(&FetchRequest::get(url)).await.unwrap_err();
    assert!(matches!(err, NetworkError::Transport { .. }));
}

#[tokio::test]
async fn test_http_network_rejects_extension_scheme() {
    let network = HttpNetwork::new().unwrap();
    let url = Url::parse("chrome-extension://abcdef/content.js").unwrap();
    let err = network.fetch(&FetchRequest::get(url)).await.unwrap_err();
    assert!(matches!(err, NetworkError::InvalidRequest { .. }));
}
