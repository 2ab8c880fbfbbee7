//! Content-type aware decoding of backend responses.

use axum::http::{header, HeaderMap};
use serde_json::Value;

/// A backend response body ready for transformation.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedBody {
    Json(Value),
    Text(String),
}

impl DecodedBody {
    /// Decode `body` according to the response `Content-Type`.
    ///
    /// Anything declaring `application/json` is parsed, an empty JSON body
    /// decoding to `null`. Everything else is kept as text.
    pub fn decode(headers: &HeaderMap, body: &[u8]) -> Result<Self, serde_json::Error> {
        if !is_json(headers) {
            return Ok(Self::Text(String::from_utf8_lossy(body).into_owned()));
        }
        if body.is_empty() {
            return Ok(Self::Json(Value::Null));
        }
        serde_json::from_slice(body).map(Self::Json)
    }

    /// The value fed to the transformation engine.
    pub fn into_value(self) -> Value {
        match self {
            Self::Json(value) => value,
            Self::Text(text) => Value::String(text),
        }
    }
}

/// Whether the response declares a JSON content type.
pub fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"))
}
