//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use jq_proxy::config::ProxyConfig;
use jq_proxy::http::HttpServer;
use jq_proxy::lifecycle::Shutdown;
use jq_proxy::proxy::Forwarder;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// A request as seen by a mock backend.
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A backend that answers every request with the same response and records
/// what it received.
pub struct MockBackend {
    pub addr: SocketAddr,
    calls: Arc<AtomicUsize>,
    captured: Arc<Mutex<Vec<Captured>>>,
}

impl MockBackend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last(&self) -> Captured {
        self.captured
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no request captured")
    }
}

/// Serve `router` on an ephemeral port.
pub async fn start_backend(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Start a recording backend with a fixed response.
pub async fn start_recording_backend(
    status: StatusCode,
    content_type: &'static str,
    response_body: &'static str,
) -> MockBackend {
    let calls = Arc::new(AtomicUsize::new(0));
    let captured = Arc::new(Mutex::new(Vec::new()));

    let (counter, log) = (calls.clone(), captured.clone());
    let router = Router::new().fallback(move |request: Request<Body>| {
        let (counter, log) = (counter.clone(), log.clone());
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            let (parts, body) = request.into_parts();
            let body = axum::body::to_bytes(body, usize::MAX)
                .await
                .unwrap_or_default();
            log.lock().unwrap().push(Captured {
                method: parts.method,
                uri: parts.uri.to_string(),
                headers: parts.headers,
                body,
            });
            (status, [(header::CONTENT_TYPE, content_type)], response_body)
        }
    });

    let addr = start_backend(router).await;
    MockBackend {
        addr,
        calls,
        captured,
    }
}

/// An address with nothing listening on it.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A running proxy.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub updates: mpsc::UnboundedSender<ProxyConfig>,
    pub client: reqwest::Client,
    shutdown: Shutdown,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// POST an envelope to `/proxy/{endpoint_path}`.
    pub async fn proxy(&self, endpoint_path: &str, envelope: Value) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/proxy/{endpoint_path}")))
            .json(&envelope)
            .send()
            .await
            .unwrap()
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start the proxy on an ephemeral port.
pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    launch(config, |config| HttpServer::new(config).unwrap()).await
}

/// Start the proxy with `forwarder` standing in for the HTTP client.
pub async fn start_proxy_with_forwarder(config: ProxyConfig, forwarder: Arc<dyn Forwarder>) -> TestProxy {
    launch(config, |config| HttpServer::with_forwarder(config, forwarder)).await
}

async fn launch(mut config: ProxyConfig, build: impl FnOnce(ProxyConfig) -> HttpServer) -> TestProxy {
    config.server.host = "127.0.0.1".into();
    config.server.upstream_timeout = 5;
    config.normalize();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = build(config);
    let (updates, rx) = mpsc::unbounded_channel();
    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();

    tokio::spawn(async move {
        server.run(listener, rx, shutdown_rx).await.unwrap();
    });

    TestProxy {
        addr,
        updates,
        client: reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap(),
        shutdown,
    }
}
