//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Bytes,
    http::{
        header::{self, HeaderName},
        HeaderMap, Method, StatusCode,
    },
    routing::{any, get},
    Router,
};
use mani_proxy::config::ProxyConfig;
use mani_proxy::http::HttpServer;
use mani_proxy::lifecycle::Shutdown;
use tokio::net::TcpListener;

/// Reflects method, headers and body. Framing headers are recomputed.
async fn echo(method: Method, mut headers: HeaderMap, body: Bytes) -> (StatusCode, HeaderMap, Bytes) {
    for name in [header::CONNECTION, header::CONTENT_LENGTH, header::TRANSFER_ENCODING, header::HOST] {
        headers.remove(name);
    }
    if let Ok(value) = method.as_str().parse() {
        headers.insert(HeaderName::from_static("x-echo-method"), value);
    }
    (StatusCode::OK, headers, body)
}

/// Start an upstream on an ephemeral port with these routes:
/// - `/text` → 200 `text/plain` `hi`
/// - `/json` → 200 `application/json` `{"a":1}`
/// - `/created` → 201 `text/plain` `made`
/// - `/fail` → 500 `text/plain` `boom`
/// - `/echo` → reflects method, headers and body
/// - `/slow` → `slow` after 300ms
pub async fn start_upstream() -> SocketAddr {
    let app = Router::new()
        .route("/text", get(|| async { ([(header::CONTENT_TYPE, "text/plain")], "hi") }))
        .route(
            "/json",
            get(|| async { ([(header::CONTENT_TYPE, "application/json")], r#"{"a":1}"#) }),
        )
        .route(
            "/created",
            any(|| async { (StatusCode::CREATED, [(header::CONTENT_TYPE, "text/plain")], "made") }),
        )
        .route(
            "/fail",
            any(|| async {
                (StatusCode::INTERNAL_SERVER_ERROR, [(header::CONTENT_TYPE, "text/plain")], "boom")
            }),
        )
        .route("/echo", any(echo))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                "slow"
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// An address nothing listens on.
pub fn closed_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// A running proxy; shuts down when dropped.
pub struct TestProxy {
    pub addr: SocketAddr,
    shutdown: Shutdown,
}

impl TestProxy {
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start the proxy on an ephemeral port.
pub async fn start_proxy(mut config: ProxyConfig) -> TestProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    config.listener.bind_address = addr.to_string();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let server = HttpServer::new(config);
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestProxy { addr, shutdown }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
