//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with all handlers
//! - Wire up middleware (tracing, request ID, CORS, deadline, panic recovery)
//! - Apply configuration updates to the endpoint registry
//! - Serve until the shutdown signal fires

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request},
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::{ProxyConfig, ServerConfig};
use crate::http::handlers;
use crate::http::middleware::{deadline, panic_response};
use crate::http::request::{request_id, UuidRequestId, X_REQUEST_ID};
use crate::proxy::{ForwardError, Forwarder, HttpForwarder, RequestProcessor};
use crate::routing::EndpointRegistry;
use crate::transform::JqEngine;

/// Limits applied while reading an inbound body.
#[derive(Debug, Clone, Copy)]
pub struct BodyLimits {
    pub max_size: usize,
    pub read_timeout: Duration,
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<EndpointRegistry>,
    pub processor: Arc<RequestProcessor>,
    pub metrics: Option<PrometheusHandle>,
    pub limits: BodyLimits,
}

/// HTTP server for the proxy.
pub struct HttpServer {
    config: ServerConfig,
    state: AppState,
}

impl HttpServer {
    /// Create a server forwarding through a pooled HTTP client.
    pub fn new(config: ProxyConfig) -> Result<Self, ForwardError> {
        let forwarder = HttpForwarder::new()?;
        Ok(Self::with_forwarder(config, Arc::new(forwarder)))
    }

    /// Create a server with a custom forwarder.
    pub fn with_forwarder(config: ProxyConfig, forwarder: Arc<dyn Forwarder>) -> Self {
        let server = config.server.clone();
        let registry = Arc::new(EndpointRegistry::new(config));
        let processor = RequestProcessor::new(registry.clone(), forwarder, JqEngine::new())
            .with_upstream_timeout(Duration::from_secs(server.upstream_timeout));

        let state = AppState {
            registry,
            processor: Arc::new(processor),
            metrics: None,
            limits: BodyLimits {
                max_size: server.max_body_size,
                read_timeout: Duration::from_secs(server.read_timeout),
            },
        };

        Self {
            config: server,
            state,
        }
    }

    /// Serve Prometheus metrics from this handle on `/metrics`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// The registry requests are resolved against.
    pub fn registry(&self) -> Arc<EndpointRegistry> {
        self.state.registry.clone()
    }

    /// Build the Axum router with all middleware layers.
    pub fn router(&self) -> Router {
        let total = Duration::from_secs(
            self.config.read_timeout + self.config.upstream_timeout + self.config.write_timeout,
        );

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

        let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            tracing::info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id(request.headers()),
            )
        });

        Router::new()
            .route("/health", get(handlers::health))
            .route("/metrics", get(handlers::metrics_handler))
            .route("/config", get(handlers::config_handler))
            .route(
                "/proxy/{endpoint}",
                post(handlers::proxy_root).options(handlers::preflight),
            )
            .route(
                "/proxy/{endpoint}/{*path}",
                post(handlers::proxy_with_path).options(handlers::preflight),
            )
            .with_state(self.state.clone())
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
                    .layer(trace)
                    .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
                    .layer(cors)
                    .layer(middleware::from_fn_with_state(total, deadline))
                    .layer(CatchPanicLayer::custom(panic_response)),
            )
    }

    /// Run the server on `listener`.
    ///
    /// Configurations received on `config_updates` replace the endpoint
    /// table. Returns after `shutdown` fires and in-flight requests finish.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let registry = self.registry();
        let updater = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                tracing::info!(
                    endpoints = config.endpoints.len(),
                    "Applying configuration update"
                );
                registry.update(config);
            }
        });

        let app = self.router();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        updater.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
