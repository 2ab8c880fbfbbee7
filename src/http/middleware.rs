//! Router-wide middleware that keeps failures inside the error envelope.

use std::any::Any;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::error::ApiError;

/// Bound the whole request, answering with a `REQUEST_TIMEOUT` envelope once
/// `limit` elapses.
pub async fn deadline(State(limit): State<Duration>, request: Request, next: Next) -> Response {
    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(limit_ms = limit.as_millis() as u64, "Request exceeded overall deadline");
            ApiError::Timeout(limit).into_response()
        }
    }
}

/// Turn a panic caught by `CatchPanicLayer` into an `INTERNAL_ERROR` envelope.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let reason = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic payload".to_string()
    };
    ApiError::Internal(format!("handler panicked: {reason}")).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, middleware, routing::get, Router};
    use serde_json::{json, Value};
    use tokio::net::TcpListener;
    use tower_http::catch_panic::CatchPanicLayer;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn app() -> Router {
        Router::new()
            .route("/fast", get(|| async { "ok" }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
            .route(
                "/boom",
                get(|| async {
                    if true {
                        panic!("state corrupted");
                    }
                    "unreachable"
                }),
            )
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(middleware::from_fn_with_state(Duration::from_millis(100), deadline))
    }

    #[tokio::test]
    async fn test_fast_request_passes_through() {
        let base = serve(app()).await;
        let response = reqwest::get(format!("{base}/fast")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_deadline_renders_envelope() {
        let base = serve(app()).await;
        let response = reqwest::get(format!("{base}/slow")).await.unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"]["code"], "REQUEST_TIMEOUT");
        assert_eq!(body["error"]["details"], Value::Null);
    }

    #[tokio::test]
    async fn test_panic_renders_internal_error() {
        let base = serve(app()).await;
        let response = reqwest::get(format!("{base}/boom")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: Value = response.json().await.unwrap();
        assert_eq!(
            body,
            json!({"error": {"code": "INTERNAL_ERROR", "message": "An unexpected error occurred", "details": null}})
        );
    }

    #[test]
    fn test_panic_payload_kinds() {
        let from_str = panic_response(Box::new("static"));
        assert_eq!(from_str.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let from_string = panic_response(Box::new(String::from("owned")));
        assert_eq!(from_string.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let opaque = panic_response(Box::new(42_u8));
        assert_eq!(opaque.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
