//! Request handlers.

use std::collections::BTreeMap;
use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::http::error::ApiError;
use crate::http::request::request_id;
use crate::http::server::{AppState, BodyLimits};
use crate::observability::metrics;
use crate::proxy::{parse_query, InboundRequest, ProcessError, ProcessedResult, ProxyRequest};

/// Name reported by `/health`.
pub const SERVICE_NAME: &str = "jq-proxy";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
}

/// Public view of the live configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigView {
    pub server: ServerView,
    pub endpoints: BTreeMap<String, EndpointView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerView {
    pub port: u16,
    pub read_timeout: u64,
    pub write_timeout: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointView {
    pub name: String,
    pub target: String,
}

/// `POST /proxy/{endpoint}`
pub async fn proxy_root(
    State(state): State<AppState>,
    Path(endpoint): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Body,
) -> Response {
    handle_proxy(state, endpoint, String::new(), query, headers, body).await
}

/// `POST /proxy/{endpoint}/{*path}`
pub async fn proxy_with_path(
    State(state): State<AppState>,
    Path((endpoint, path)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Body,
) -> Response {
    handle_proxy(state, endpoint, path, query, headers, body).await
}

/// `OPTIONS /proxy/...` without CORS preflight headers.
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn handle_proxy(
    state: AppState,
    endpoint: String,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let start = Instant::now();
    let request_id = request_id(&headers).to_string();
    let path = normalize_path(path);

    tracing::debug!(
        request_id = %request_id,
        endpoint = %endpoint,
        path = %path,
        "Received proxy request"
    );

    match proxy(&state, &endpoint, path, query, headers, body).await {
        Ok(result) => {
            metrics::record_request(&endpoint, result.status.as_u16(), start);
            (result.status, Json(result.data)).into_response()
        }
        Err(err) => {
            // Unknown names would otherwise grow the label set without bound
            let label = match &err {
                ApiError::Process(ProcessError::EndpointNotFound { .. }) => "unknown",
                _ => endpoint.as_str(),
            };
            tracing::warn!(
                request_id = %request_id,
                endpoint = %endpoint,
                code = err.code(),
                error = %err,
                "Proxy request failed"
            );
            metrics::record_request(label, err.status().as_u16(), start);
            metrics::record_error(label, err.code());
            err.into_response()
        }
    }
}

async fn proxy(
    state: &AppState,
    endpoint: &str,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<ProcessedResult, ApiError> {
    let bytes = read_body(body, state.limits).await?;
    let envelope = ProxyRequest::parse(&bytes)
        .map_err(|e| ApiError::InvalidRequest(format!("Invalid request format: {e}")))?;

    let inbound = InboundRequest {
        endpoint: endpoint.to_string(),
        path,
        query: parse_query(query.as_deref()),
        headers: Some(headers),
        envelope,
    };
    Ok(state.processor.process(inbound).await?)
}

async fn read_body(body: Body, limits: BodyLimits) -> Result<Bytes, ApiError> {
    let read = tokio::time::timeout(limits.read_timeout, axum::body::to_bytes(body, limits.max_size)).await;
    match read {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Failed to read request body");
            Err(ApiError::InvalidRequest("Failed to read request body".into()))
        }
        Err(_) => {
            tracing::error!(timeout = ?limits.read_timeout, "Timed out reading request body");
            Err(ApiError::InvalidRequest("Failed to read request body".into()))
        }
    }
}

/// Ensure a non-empty path starts with `/`.
pub fn normalize_path(path: String) -> String {
    if path.is_empty() || path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}

/// `GET /health`
pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
    })
}

/// `GET /metrics`
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// `GET /config`
pub async fn config_handler(State(state): State<AppState>) -> Json<ConfigView> {
    let config = state.registry.snapshot();
    Json(ConfigView {
        server: ServerView {
            port: config.server.port,
            read_timeout: config.server.read_timeout,
            write_timeout: config.server.write_timeout,
        },
        endpoints: config
            .endpoints
            .iter()
            .map(|(key, endpoint)| {
                (
                    key.clone(),
                    EndpointView {
                        name: endpoint.name.clone(),
                        target: endpoint.target.clone(),
                    },
                )
            })
            .collect(),
    })
}
