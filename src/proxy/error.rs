//! Failure taxonomy of the request pipeline.
//!
//! Every failure the pipeline can produce is one variant of
//! [`ProcessError`]. Each variant maps to a fixed HTTP status, a machine
//! readable code and a details object; the HTTP layer renders all of them
//! through the same error envelope.

use std::fmt;

use axum::http::StatusCode;
use serde_json::{json, Value};

use crate::transform::{CompileError, RuntimeError};

/// Which step of the upstream exchange failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamStage {
    /// The request never produced a response (DNS, refused, timeout, TLS).
    Connect,
    /// The backend advertised JSON but sent something unparseable.
    Decode,
}

impl fmt::Display for UpstreamStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => f.write_str("Failed to connect to target endpoint"),
            Self::Decode => f.write_str("Failed to parse response from target endpoint"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("endpoint '{name}' not found")]
    EndpointNotFound {
        name: String,
        available: Vec<String>,
    },

    #[error("Invalid transformation: {source}")]
    InvalidTransformation {
        query: String,
        #[source]
        source: CompileError,
    },

    #[error("{stage}")]
    UpstreamFailure {
        stage: UpstreamStage,
        endpoint: String,
        target: String,
        /// Backend status, known only when a response arrived.
        status: Option<StatusCode>,
        error: String,
    },

    #[error("Failed to transform response: {source}")]
    TransformationFailure {
        query: String,
        #[source]
        source: RuntimeError,
    },
}

impl ProcessError {
    /// HTTP status the caller receives.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::EndpointNotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidTransformation { .. } | Self::TransformationFailure { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::UpstreamFailure { status, .. } => match status {
                Some(s) if s.as_u16() >= 400 => *s,
                _ => StatusCode::BAD_GATEWAY,
            },
        }
    }

    /// Machine readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EndpointNotFound { .. } => "ENDPOINT_NOT_FOUND",
            Self::InvalidTransformation { .. } | Self::TransformationFailure { .. } => {
                "TRANSFORMATION_ERROR"
            }
            Self::UpstreamFailure { .. } => "UPSTREAM_ERROR",
        }
    }

    /// Structured context for the `details` field.
    pub fn details(&self) -> Value {
        match self {
            Self::EndpointNotFound { available, .. } => {
                json!({ "available_endpoints": available })
            }
            Self::InvalidTransformation { query, .. } => json!({ "query": query }),
            Self::UpstreamFailure {
                stage: UpstreamStage::Connect,
                endpoint,
                target,
                error,
                ..
            } => json!({ "endpoint": endpoint, "target": target, "error": error }),
            Self::UpstreamFailure {
                stage: UpstreamStage::Decode,
                endpoint,
                error,
                ..
            } => json!({ "endpoint": endpoint, "error": error }),
            Self::TransformationFailure { query, source } => {
                json!({ "query": query, "error": source.to_string() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream(stage: UpstreamStage, status: Option<StatusCode>) -> ProcessError {
        ProcessError::UpstreamFailure {
            stage,
            endpoint: "api".into(),
            target: "http://127.0.0.1:9".into(),
            status,
            error: "connection refused".into(),
        }
    }

    #[test]
    fn test_endpoint_not_found() {
        let err = ProcessError::EndpointNotFound {
            name: "nope".into(),
            available: vec!["posts".into(), "users".into()],
        };
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "ENDPOINT_NOT_FOUND");
        assert_eq!(err.to_string(), "endpoint 'nope' not found");
        assert_eq!(err.details(), json!({"available_endpoints": ["posts", "users"]}));
    }

    #[test]
    fn test_transformation_errors_share_code() {
        let invalid = ProcessError::InvalidTransformation {
            query: ".[".into(),
            source: CompileError { message: "unexpected end".into() },
        };
        let failed = ProcessError::TransformationFailure {
            query: ".foo".into(),
            source: RuntimeError { message: "cannot index array".into() },
        };

        assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(failed.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(invalid.code(), "TRANSFORMATION_ERROR");
        assert_eq!(failed.code(), "TRANSFORMATION_ERROR");
        assert_eq!(invalid.details(), json!({"query": ".["}));
        assert_eq!(
            failed.details(),
            json!({"query": ".foo", "error": "jq query execution failed: cannot index array"})
        );
        assert!(invalid.to_string().starts_with("Invalid transformation: "));
    }

    #[test]
    fn test_upstream_status_mapping() {
        assert_eq!(upstream(UpstreamStage::Connect, None).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            upstream(UpstreamStage::Decode, Some(StatusCode::OK)).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            upstream(UpstreamStage::Decode, Some(StatusCode::SERVICE_UNAVAILABLE)).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_upstream_details_by_stage() {
        let connect = upstream(UpstreamStage::Connect, None);
        assert_eq!(connect.code(), "UPSTREAM_ERROR");
        assert_eq!(connect.to_string(), "Failed to connect to target endpoint");
        assert_eq!(
            connect.details(),
            json!({"endpoint": "api", "target": "http://127.0.0.1:9", "error": "connection refused"})
        );

        let decode = upstream(UpstreamStage::Decode, Some(StatusCode::OK));
        assert_eq!(decode.to_string(), "Failed to parse response from target endpoint");
        assert_eq!(decode.details(), json!({"endpoint": "api", "error": "connection refused"}));
    }
}
