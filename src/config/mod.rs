//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (JSON/TOML) and/or PROXY_* environment variables
//!     → loader.rs (parse, env overrides, normalize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → installed into the EndpointRegistry snapshot
//!
//! On reload (file change or SIGHUP):
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap of Arc<ProxyConfig> in the registry
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError, ConfigSource};
pub use schema::{EndpointConfig, LogFormat, ObservabilityConfig, ProxyConfig, ServerConfig};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
