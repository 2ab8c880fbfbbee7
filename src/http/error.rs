//! Error responses.
//!
//! Every failure leaves the proxy as
//! `{"error": {"code": ..., "message": ..., "details": ...}}`.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::proxy::ProcessError;

/// Transport-level failure.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The inbound request could not be read or its envelope is malformed.
    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Process(#[from] ProcessError),

    /// The request as a whole outlived the server's deadline.
    #[error("Request did not complete within {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// Anything else. Details are never exposed.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Process(e) => e.status(),
            Self::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Process(e) => e.code(),
            Self::Timeout(_) => "REQUEST_TIMEOUT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Render the wire envelope.
    pub fn body(&self) -> ErrorResponse {
        let (message, details) = match self {
            Self::InvalidRequest(message) => (message.clone(), Value::Null),
            Self::Process(e) => (e.to_string(), e.details()),
            Self::Timeout(_) => (self.to_string(), Value::Null),
            Self::Internal(_) => ("An unexpected error occurred".to_string(), Value::Null),
        };
        ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
                details,
            },
        }
    }
}

/// Wire shape of an error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    pub details: Value,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(reason) = &self {
            tracing::error!(error = %reason, "Unexpected error in proxy request");
        }
        (self.status(), Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invalid_request_envelope() {
        let err = ApiError::InvalidRequest("Failed to read request body".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            serde_json::to_value(err.body()).unwrap(),
            json!({"error": {"code": "INVALID_REQUEST", "message": "Failed to read request body", "details": null}})
        );
    }

    #[test]
    fn test_internal_hides_reason() {
        let err = ApiError::Internal("poisoned state".into());
        let body = err.body();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error.code, "INTERNAL_ERROR");
        assert!(!body.error.message.contains("poisoned"));
        assert_eq!(body.error.details, Value::Null);
    }

    #[test]
    fn test_timeout_envelope() {
        let err = ApiError::Timeout(Duration::from_secs(90));
        assert_eq!(err.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(
            serde_json::to_value(err.body()).unwrap(),
            json!({"error": {"code": "REQUEST_TIMEOUT", "message": "Request did not complete within 90s", "details": null}})
        );
    }

    #[test]
    fn test_process_error_passthrough() {
        let err = ApiError::from(ProcessError::EndpointNotFound {
            name: "x".into(),
            available: vec!["a".into()],
        });
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        let body = err.body();
        assert_eq!(body.error.code, "ENDPOINT_NOT_FOUND");
        assert_eq!(body.error.message, "endpoint 'x' not found");
        assert_eq!(body.error.details, json!({"available_endpoints": ["a"]}));
    }
}
