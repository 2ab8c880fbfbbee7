//! Request pipeline orchestration.
//!
//! # Pipeline
//! ```text
//! resolve endpoint      → EndpointNotFound
//!     → compile query   → InvalidTransformation   (no network call yet)
//!     → forward         → UpstreamFailure (connect / timeout)
//!     → decode          → UpstreamFailure (bad JSON)
//!     → transform       → TransformationFailure
//!     → ProcessedResult { data, backend status }
//! ```
//!
//! The steps run strictly in this order and the first failure wins. The
//! transform step is CPU-bound and runs on the blocking pool, never on an
//! async worker.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use serde_json::Value;

use crate::proxy::decode::DecodedBody;
use crate::proxy::envelope::ProxyRequest;
use crate::proxy::error::{ProcessError, UpstreamStage};
use crate::proxy::forwarder::{ForwardError, Forwarder, OutboundRequest, QueryParams, RequestBody};
use crate::routing::EndpointResolver;
use crate::transform::{JqEngine, RuntimeError, TransformEngine};

/// Default deadline for the outbound call.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// One inbound proxy call, already validated by the HTTP layer.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    /// Endpoint name from `/proxy/{endpoint}`.
    pub endpoint: String,
    /// Remaining path, empty or starting with `/`.
    pub path: String,
    pub query: QueryParams,
    pub headers: Option<HeaderMap>,
    pub envelope: ProxyRequest,
}

/// Transformed data plus the backend's own status.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedResult {
    pub data: Value,
    pub status: StatusCode,
}

/// Runs the pipeline. Holds no per-request state and is shared by all
/// handlers.
pub struct RequestProcessor<E: TransformEngine = JqEngine> {
    resolver: Arc<dyn EndpointResolver>,
    forwarder: Arc<dyn Forwarder>,
    engine: Arc<E>,
    upstream_timeout: Duration,
}

impl<E: TransformEngine> RequestProcessor<E> {
    pub fn new(resolver: Arc<dyn EndpointResolver>, forwarder: Arc<dyn Forwarder>, engine: E) -> Self {
        Self {
            resolver,
            forwarder,
            engine: Arc::new(engine),
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }

    /// Override the outbound deadline.
    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    pub fn upstream_timeout(&self) -> Duration {
        self.upstream_timeout
    }

    /// Run one request through the pipeline.
    pub async fn process(&self, request: InboundRequest) -> Result<ProcessedResult, ProcessError> {
        let InboundRequest {
            endpoint: name,
            path,
            query,
            headers,
            envelope,
        } = request;

        tracing::info!(
            endpoint = %name,
            path = %path,
            method = %envelope.method,
            "Processing proxy request"
        );

        let Some(endpoint) = self.resolver.resolve(&name) else {
            tracing::warn!(endpoint = %name, "Endpoint not found");
            return Err(ProcessError::EndpointNotFound {
                available: self.resolver.list_names(),
                name,
            });
        };

        let program = self.engine.compile(&envelope.query).map_err(|source| {
            tracing::error!(error = %source, query = %envelope.query, "Invalid transformation");
            ProcessError::InvalidTransformation {
                query: envelope.query.clone(),
                source,
            }
        })?;

        let outbound = OutboundRequest {
            method: envelope.method,
            base_url: endpoint.target.clone(),
            path,
            query,
            headers,
            body: envelope.body.map(RequestBody::from),
        };
        let forwarded = match tokio::time::timeout(self.upstream_timeout, self.forwarder.forward(outbound)).await {
            Ok(result) => result,
            Err(_) => Err(ForwardError::Timeout(self.upstream_timeout)),
        };
        let response = forwarded.map_err(|e| {
            tracing::error!(endpoint = %endpoint.name, target = %endpoint.target, error = %e, "Failed to forward request");
            ProcessError::UpstreamFailure {
                stage: UpstreamStage::Connect,
                endpoint: endpoint.name.clone(),
                target: endpoint.target.clone(),
                status: None,
                error: e.to_string(),
            }
        })?;

        if response.status.is_client_error() || response.status.is_server_error() {
            tracing::warn!(
                endpoint = %endpoint.name,
                status_code = response.status.as_u16(),
                "Target endpoint returned error status"
            );
        }

        let decoded = DecodedBody::decode(&response.headers, &response.body).map_err(|e| {
            tracing::error!(endpoint = %endpoint.name, error = %e, "Failed to parse JSON response");
            ProcessError::UpstreamFailure {
                stage: UpstreamStage::Decode,
                endpoint: name.clone(),
                target: endpoint.target.clone(),
                status: Some(response.status),
                error: e.to_string(),
            }
        })?;

        let engine = Arc::clone(&self.engine);
        let input = decoded.into_value();
        let transformed = match tokio::task::spawn_blocking(move || engine.apply(&program, input)).await {
            Ok(result) => result,
            // Re-raise so the HTTP layer answers with INTERNAL_ERROR
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(RuntimeError {
                message: e.to_string(),
            }),
        };
        let data = transformed.map_err(|source| {
            tracing::error!(error = %source, "Failed to transform response");
            ProcessError::TransformationFailure {
                query: envelope.query.clone(),
                source,
            }
        })?;

        tracing::info!(
            endpoint = %endpoint.name,
            status_code = response.status.as_u16(),
            "Successfully processed proxy request"
        );

        Ok(ProcessedResult {
            data,
            status: response.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::body::Bytes;
    use axum::http::{header, HeaderValue, Method};
    use serde_json::json;

    use crate::config::ProxyConfig;
    use crate::proxy::forwarder::OutboundResult;
    use crate::routing::EndpointRegistry;

    enum Reply {
        Respond(StatusCode, &'static str, &'static str),
        Refuse,
        Hang,
    }

    struct MockForwarder {
        reply: Reply,
        calls: AtomicUsize,
        last: Mutex<Option<OutboundRequest>>,
    }

    impl MockForwarder {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
                last: Mutex::new(None),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Forwarder for MockForwarder {
        async fn forward(&self, request: OutboundRequest) -> Result<OutboundResult, ForwardError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(request);
            match self.reply {
                Reply::Respond(status, content_type, body) => {
                    let mut headers = HeaderMap::new();
                    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
                    Ok(OutboundResult {
                        status,
                        headers,
                        body: Bytes::from_static(body.as_bytes()),
                    })
                }
                Reply::Refuse => Err(ForwardError::InvalidTargetUrl {
                    url: "http://127.0.0.1:1".into(),
                    reason: "connection refused".into(),
                }),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Err(ForwardError::Timeout(Duration::from_secs(30)))
                }
            }
        }
    }

    fn processor(forwarder: Arc<MockForwarder>) -> RequestProcessor {
        let config = ProxyConfig::default()
            .with_endpoint("users", "https://api.example.com")
            .with_endpoint("posts", "https://posts.example.com/v1");
        RequestProcessor::new(Arc::new(EndpointRegistry::new(config)), forwarder, JqEngine::new())
    }

    fn request(endpoint: &str, query: &str) -> InboundRequest {
        InboundRequest {
            endpoint: endpoint.into(),
            path: "/users".into(),
            query: QueryParams::new(),
            headers: None,
            envelope: ProxyRequest {
                method: Method::GET,
                body: None,
                query: query.into(),
            },
        }
    }

    const USERS: &str = r#"{"data":[{"id":1,"name":"John"},{"id":2,"name":"Jane"}],"total":2}"#;

    #[tokio::test]
    async fn test_transforms_backend_json() {
        let forwarder = MockForwarder::new(Reply::Respond(StatusCode::OK, "application/json", USERS));
        let result = processor(forwarder.clone())
            .process(request("users", "{names: [.data[].name], count: .total}"))
            .await
            .unwrap();

        assert_eq!(result.status, StatusCode::OK);
        assert_eq!(result.data, json!({"names": ["John", "Jane"], "count": 2}));

        let sent = forwarder.last.lock().unwrap().take().unwrap();
        assert_eq!(sent.base_url, "https://api.example.com");
        assert_eq!(sent.path, "/users");
    }

    #[tokio::test]
    async fn test_unknown_endpoint_lists_available() {
        let forwarder = MockForwarder::new(Reply::Refuse);
        let err = processor(forwarder.clone())
            .process(request("missing", "."))
            .await
            .unwrap_err();

        match err {
            ProcessError::EndpointNotFound { name, available } => {
                assert_eq!(name, "missing");
                assert_eq!(available, vec!["posts", "users"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(forwarder.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_query_never_contacts_backend() {
        let forwarder = MockForwarder::new(Reply::Hang);
        let err = processor(forwarder.clone())
            .process(request("users", ".data[ | invalid"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessError::InvalidTransformation { ref query, .. } if query == ".data[ | invalid"));
        assert_eq!(forwarder.calls(), 0);
    }

    #[tokio::test]
    async fn test_backend_status_is_propagated() {
        let forwarder = MockForwarder::new(Reply::Respond(
            StatusCode::NOT_FOUND,
            "application/json",
            r#"{"message":"user not found"}"#,
        ));
        let result = processor(forwarder)
            .process(request("users", ".message"))
            .await
            .unwrap();

        assert_eq!(result.status, StatusCode::NOT_FOUND);
        assert_eq!(result.data, json!("user not found"));
    }

    #[tokio::test]
    async fn test_text_body_is_a_string() {
        let forwarder = MockForwarder::new(Reply::Respond(StatusCode::OK, "text/plain", "hello"));
        let result = processor(forwarder).process(request("users", ".")).await.unwrap();
        assert_eq!(result.data, json!("hello"));
    }

    #[tokio::test]
    async fn test_connect_failure_is_upstream_error() {
        let forwarder = MockForwarder::new(Reply::Refuse);
        let err = processor(forwarder).process(request("posts", ".")).await.unwrap_err();

        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.details()["endpoint"], "posts");
        assert_eq!(err.details()["target"], "https://posts.example.com/v1");
    }

    #[tokio::test]
    async fn test_timeout_is_upstream_error() {
        let forwarder = MockForwarder::new(Reply::Hang);
        let err = processor(forwarder)
            .with_upstream_timeout(Duration::from_millis(50))
            .process(request("users", "."))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProcessError::UpstreamFailure { stage: UpstreamStage::Connect, .. }
        ));
        assert!(err.details()["error"].as_str().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_bad_json_is_upstream_error() {
        let forwarder = MockForwarder::new(Reply::Respond(
            StatusCode::SERVICE_UNAVAILABLE,
            "application/json",
            "<html>down</html>",
        ));
        let err = processor(forwarder).process(request("users", ".")).await.unwrap_err();

        assert_eq!(err.code(), "UPSTREAM_ERROR");
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_runtime_failure_is_transformation_error() {
        let forwarder = MockForwarder::new(Reply::Respond(StatusCode::OK, "application/json", "[1,2]"));
        let err = processor(forwarder).process(request("users", ".foo")).await.unwrap_err();

        assert!(matches!(err, ProcessError::TransformationFailure { .. }));
        assert_eq!(err.details()["query"], ".foo");
    }

    #[tokio::test]
    async fn test_collapsing() {
        let forwarder = MockForwarder::new(Reply::Respond(StatusCode::OK, "application/json", "[1,2,3]"));
        let processor = processor(forwarder);

        let many = processor.process(request("users", ".[]")).await.unwrap();
        assert_eq!(many.data, json!([1, 2, 3]));

        let none = processor.process(request("users", "empty")).await.unwrap();
        assert_eq!(none.data, Value::Null);

        let one = processor.process(request("users", ".[1]")).await.unwrap();
        assert_eq!(one.data, json!(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_expensive_query_does_not_stall_the_runtime() {
        let forwarder = MockForwarder::new(Reply::Respond(StatusCode::OK, "application/json", "null"));
        let processor = Arc::new(processor(forwarder));

        let heavy = tokio::spawn({
            let processor = Arc::clone(&processor);
            async move {
                processor
                    .process(request("users", "reduce range(5000000) as $x (0; . + 1)"))
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Runs on the single worker; only completes promptly if that worker is free
        let ticker = tokio::spawn(async {
            let started = std::time::Instant::now();
            tokio::time::sleep(Duration::from_millis(10)).await;
            started.elapsed()
        });

        let waited = ticker.await.unwrap();
        assert!(waited < Duration::from_millis(500), "timer delayed by {waited:?}");

        let result = heavy.await.unwrap().unwrap();
        assert_eq!(result.data, json!(5000000));
    }
}
