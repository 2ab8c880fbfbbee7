//! Outbound request forwarding.
//!
//! # Responsibilities
//! - Build the target URL from base URL, relative path and query parameters
//! - Drop proxy-internal `jpx-*` headers
//! - Encode the request body
//! - Perform exactly one outbound call and buffer the whole response
//!
//! # Design Decisions
//! - A non-2xx status is a valid result, not an error
//! - Only transport failures (DNS, refused, TLS, read) are errors
//! - The deadline is applied by the caller, not by the client
//! - One pooled client is shared by every request

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde_json::Value;
use url::{form_urlencoded, Url};

/// Query parameters. Keys sort lexicographically, values keep their order.
pub type QueryParams = BTreeMap<String, Vec<String>>;

/// Prefix of proxy-internal headers that never reach a backend.
pub const INTERNAL_HEADER_PREFIX: &str = "jpx-";

/// Headers owned by the connection rather than the request.
const CONNECTION_HEADERS: [HeaderName; 7] = [
    header::HOST,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::CONNECTION,
    header::UPGRADE,
    header::TE,
    header::TRAILER,
];

const MAX_IDLE_PER_HOST: usize = 10;
const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("invalid base URL '{url}': {reason}")]
    InvalidTargetUrl { url: String, reason: String },

    #[error("failed to marshal request body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// Outbound request body.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Sent verbatim.
    Raw(Bytes),
    /// Sent verbatim as UTF-8.
    Text(String),
    /// JSON-encoded before sending.
    Json(Value),
}

impl RequestBody {
    /// Serialize into the bytes put on the wire.
    pub fn encode(self) -> Result<Bytes, ForwardError> {
        match self {
            Self::Raw(bytes) => Ok(bytes),
            Self::Text(text) => Ok(Bytes::from(text)),
            Self::Json(value) => Ok(Bytes::from(serde_json::to_vec(&value)?)),
        }
    }
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            other => Self::Json(other),
        }
    }
}

/// Everything needed for one outbound call.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub base_url: String,
    pub path: String,
    pub query: QueryParams,
    /// Inbound headers; `None` when the caller had none at all.
    pub headers: Option<HeaderMap>,
    pub body: Option<RequestBody>,
}

/// A completed exchange with a backend, whatever its status.
#[derive(Debug, Clone)]
pub struct OutboundResult {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Performs outbound calls.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, request: OutboundRequest) -> Result<OutboundResult, ForwardError>;
}

/// Parse a raw query string into [`QueryParams`].
pub fn parse_query(raw: Option<&str>) -> QueryParams {
    let mut params = QueryParams::new();
    for (key, value) in form_urlencoded::parse(raw.unwrap_or_default().as_bytes()) {
        params.entry(key.into_owned()).or_default().push(value.into_owned());
    }
    params
}

/// Join `path` onto `base` and attach `query`.
///
/// Exactly one `/` separates the base path from `path`. Query keys are
/// emitted in sorted order, repeated keys in their given order.
pub fn build_target_url(base: &str, path: &str, query: &QueryParams) -> Result<Url, ForwardError> {
    let invalid = |reason: String| ForwardError::InvalidTargetUrl {
        url: base.to_string(),
        reason,
    };
    let mut url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(invalid("not a hierarchical URL".to_string()));
    }

    if !path.is_empty() {
        let base_path = url.path();
        let joined = match (base_path.ends_with('/'), path.starts_with('/')) {
            (true, true) => format!("{base_path}{}", &path[1..]),
            (false, false) => format!("{base_path}/{path}"),
            _ => format!("{base_path}{path}"),
        };
        url.set_path(&joined);
    }

    if !query.is_empty() {
        let mut encoded = form_urlencoded::Serializer::new(String::new());
        for (key, values) in query {
            for value in values {
                encoded.append_pair(key, value);
            }
        }
        url.set_query(Some(&encoded.finish()));
    }

    Ok(url)
}

/// Drop every `jpx-*` header. Absent input stays absent.
pub fn filter_headers(headers: Option<&HeaderMap>) -> Option<HeaderMap> {
    headers.map(|headers| {
        let mut filtered = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            // HeaderName is always lowercase
            if !name.as_str().starts_with(INTERNAL_HEADER_PREFIX) {
                filtered.append(name.clone(), value.clone());
            }
        }
        filtered
    })
}

/// Headers actually put on the outbound request.
fn outbound_headers(filtered: Option<HeaderMap>, has_body: bool) -> HeaderMap {
    let mut headers = filtered.unwrap_or_default();
    for name in &CONNECTION_HEADERS {
        headers.remove(name);
    }
    headers.remove("keep-alive");
    headers.remove("proxy-connection");

    if has_body && !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
    }
    headers
}

/// [`Forwarder`] backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    client: reqwest::Client,
}

impl HttpForwarder {
    /// Create a forwarder with its own connection pool.
    pub fn new() -> Result<Self, ForwardError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
            .pool_idle_timeout(IDLE_TIMEOUT)
            .build()
            .map_err(ForwardError::Client)?;
        Ok(Self { client })
    }

    /// Use an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, request: OutboundRequest) -> Result<OutboundResult, ForwardError> {
        let url = build_target_url(&request.base_url, &request.path, &request.query)?;
        let body = request.body.map(RequestBody::encode).transpose()?;
        let headers = outbound_headers(filter_headers(request.headers.as_ref()), body.is_some());

        tracing::debug!(method = %request.method, url = %url, "Forwarding request");

        let mut builder = self.client.request(request.method, url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(ForwardError::Request)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(ForwardError::Body)?;

        Ok(OutboundResult {
            status,
            headers,
            body,
        })
    }
}
