//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware: trace, request ID, CORS, deadline, panic recovery)
//!     → handlers.rs (read body, parse envelope, call the pipeline)
//!     → [proxy::RequestProcessor]
//!     → transformed JSON with the backend status, or error.rs envelope
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod request;
pub mod server;

pub use error::{ApiError, ErrorResponse};
pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
