//! Hot-swappable endpoint table.
//!
//! # Responsibilities
//! - Hold the current configuration snapshot
//! - Answer `resolve` / `list_names` without blocking writers
//! - Replace the snapshot atomically on reload

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::ProxyConfig;
use crate::routing::{Endpoint, EndpointResolver};

/// Endpoint registry backed by an atomically swapped `ProxyConfig`.
#[derive(Debug)]
pub struct EndpointRegistry {
    current: ArcSwap<ProxyConfig>,
}

impl EndpointRegistry {
    /// Create a registry serving `config`.
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(config),
        }
    }

    /// Replace the served configuration.
    pub fn update(&self, config: ProxyConfig) {
        self.current.store(Arc::new(config));
    }

    /// The configuration currently being served.
    pub fn snapshot(&self) -> Arc<ProxyConfig> {
        self.current.load_full()
    }
}

impl EndpointResolver for EndpointRegistry {
    fn resolve(&self, name: &str) -> Option<Endpoint> {
        let config = self.current.load();
        config.endpoints.get(name).map(|endpoint| Endpoint {
            name: endpoint.name.clone(),
            target: endpoint.target.clone(),
        })
    }

    fn list_names(&self) -> Vec<String> {
        // BTreeMap keys are already sorted
        self.current.load().endpoints.keys().cloned().collect()
    }
}
