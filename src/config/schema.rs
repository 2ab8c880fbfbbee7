//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from JSON or TOML files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener and timeout settings.
    pub server: ServerConfig,

    /// Named endpoints, keyed by the name clients put in `/proxy/{name}`.
    pub endpoints: BTreeMap<String, EndpointConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ProxyConfig {
    /// Fill in derived fields after deserialization.
    ///
    /// An endpoint without an explicit `name` takes its map key.
    pub fn normalize(&mut self) {
        for (key, endpoint) in self.endpoints.iter_mut() {
            if endpoint.name.is_empty() {
                endpoint.name = key.clone();
            }
        }
    }

    /// Convenience constructor used by tests and embedders.
    pub fn with_endpoint(mut self, key: impl Into<String>, target: impl Into<String>) -> Self {
        let key = key.into();
        self.endpoints.insert(
            key.clone(),
            EndpointConfig {
                name: key,
                target: target.into(),
            },
        );
        self
    }
}

/// Server configuration. Timeouts are in seconds.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,

    /// Port to listen on.
    pub port: u16,

    /// Time allowed to read the inbound request body.
    pub read_timeout: u64,

    /// Time allowed to write the response back to the client.
    pub write_timeout: u64,

    /// Deadline for each outbound call to a backend.
    pub upstream_timeout: u64,

    /// Maximum inbound body size in bytes.
    pub max_body_size: usize,
}

impl ServerConfig {
    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            read_timeout: 30,
            write_timeout: 30,
            upstream_timeout: 30,
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// A named backend.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Display name. Defaults to the map key.
    #[serde(default)]
    pub name: String,

    /// Absolute `http://` or `https://` base URL.
    pub target: String,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, for development.
    Pretty,
    /// One JSON object per line.
    #[default]
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Expose Prometheus metrics on `/metrics`.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            metrics_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.upstream_timeout, 30);
        assert_eq!(config.server.bind_address(), "0.0.0.0:8080");
        assert!(config.endpoints.is_empty());
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }

    #[test]
    fn test_normalize_fills_names_from_keys() {
        let mut config: ProxyConfig = serde_json::from_str(
            r#"{"endpoints": {"users": {"target": "https://api.example.com"},
                              "posts": {"name": "post-api", "target": "https://api.example.com"}}}"#,
        )
        .unwrap();
        config.normalize();

        assert_eq!(config.endpoints["users"].name, "users");
        assert_eq!(config.endpoints["posts"].name, "post-api");
    }

    #[test]
    fn test_partial_server_section_keeps_defaults() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [endpoints.api]
            target = "http://localhost:3000"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.read_timeout, 30);
        assert_eq!(config.endpoints["api"].target, "http://localhost:3000");
    }
}
