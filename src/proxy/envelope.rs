//! Inbound request envelope.
//!
//! Clients POST `{"method": ..., "body": ..., "jq_query": ...}` to
//! `/proxy/{endpoint}/{path}`. The envelope is validated here, before the
//! request pipeline runs, so the pipeline can rely on a known method and a
//! non-empty query.

use axum::http::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The only transformation mode.
pub const MODE_JQ: &str = "jq";

const ALLOWED_METHODS: [Method; 7] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
    Method::HEAD,
    Method::OPTIONS,
];

/// Reasons an envelope is rejected.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("validation failed: method is required")]
    MissingMethod,

    #[error("validation failed: invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("validation failed: invalid transformation mode: {0}. Must be 'jq'")]
    UnsupportedMode(String),

    #[error("validation failed: jq_query is required")]
    MissingQuery,
}

/// Wire shape of the envelope.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawEnvelope {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation_mode: Option<String>,
    #[serde(default)]
    pub jq_query: String,
}

/// A validated envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyRequest {
    /// Outbound method.
    pub method: Method,
    /// Outbound body; `None` when absent or `null`.
    pub body: Option<Value>,
    /// Transformation query.
    pub query: String,
}

impl ProxyRequest {
    /// Parse and validate an envelope from raw bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let raw: RawEnvelope = serde_json::from_slice(bytes)?;
        Self::try_from(raw)
    }
}

impl TryFrom<RawEnvelope> for ProxyRequest {
    type Error = EnvelopeError;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        if raw.method.is_empty() {
            return Err(EnvelopeError::MissingMethod);
        }
        let upper = raw.method.to_ascii_uppercase();
        let method = ALLOWED_METHODS
            .iter()
            .find(|m| m.as_str() == upper)
            .cloned()
            .ok_or_else(|| EnvelopeError::InvalidMethod(raw.method.clone()))?;

        match raw.transformation_mode.as_deref() {
            None | Some("") | Some(MODE_JQ) => {}
            Some(other) => return Err(EnvelopeError::UnsupportedMode(other.to_string())),
        }

        if raw.jq_query.trim().is_empty() {
            return Err(EnvelopeError::MissingQuery);
        }

        Ok(Self {
            method,
            body: raw.body.filter(|b| !b.is_null()),
            query: raw.jq_query,
        })
    }
}
