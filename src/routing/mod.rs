//! Endpoint resolution subsystem.
//!
//! # Data Flow
//! ```text
//! /proxy/{endpoint}/...
//!     → EndpointResolver::resolve(name)
//!     → Some(Endpoint { name, target }) or None
//!
//! On None:
//!     → EndpointResolver::list_names() for the error details
//! ```
//!
//! # Design Decisions
//! - Lookups read an immutable snapshot (no locks on the hot path)
//! - Reloads swap the whole table atomically
//! - `resolve` and `list_names` may observe different snapshots; the name
//!   list only feeds diagnostics

pub mod registry;

pub use registry::EndpointRegistry;

/// A resolved backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Display name of the endpoint.
    pub name: String,
    /// Absolute base URL requests are forwarded to.
    pub target: String,
}

/// Maps logical endpoint names to backend base URLs.
///
/// Implementations must be safe to call concurrently with each other and
/// with any internal reload.
pub trait EndpointResolver: Send + Sync {
    /// Look up an endpoint by the name used in the request path.
    fn resolve(&self, name: &str) -> Option<Endpoint>;

    /// Every currently known endpoint name.
    fn list_names(&self) -> Vec<String>;
}
