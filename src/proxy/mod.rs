//! Request processing pipeline.
//!
//! # Data Flow
//! ```text
//! POST /proxy/{endpoint}/{path}
//!     → envelope.rs   (method, body, jq_query; rejected with 400 if malformed)
//!     → processor.rs  (resolve → compile → forward → decode → transform)
//!         → forwarder.rs (target URL, header filtering, outbound call)
//!         → decode.rs    (JSON or text by content type)
//!     → ProcessedResult or ProcessError (error.rs)
//! ```

pub mod decode;
pub mod envelope;
pub mod error;
pub mod forwarder;
pub mod processor;

pub use decode::DecodedBody;
pub use envelope::{EnvelopeError, ProxyRequest};
pub use error::{ProcessError, UpstreamStage};
pub use forwarder::{
    build_target_url, filter_headers, parse_query, ForwardError, Forwarder, HttpForwarder,
    OutboundRequest, OutboundResult, QueryParams, RequestBody,
};
pub use processor::{InboundRequest, ProcessedResult, RequestProcessor};
