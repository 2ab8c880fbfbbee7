//! Configuration file watcher for hot reload.

use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::ConfigSource;
use crate::config::schema::ProxyConfig;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    source: ConfigSource,
    update_tx: mpsc::UnboundedSender<ProxyConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(source: ConfigSource) -> (Self, mpsc::UnboundedReceiver<ProxyConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (Self { source, update_tx }, update_rx)
    }

    /// Another handle on the update channel, e.g. for SIGHUP reloads.
    pub fn sender(&self) -> mpsc::UnboundedSender<ProxyConfig> {
        self.update_tx.clone()
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned handle must be kept alive for as long as watching should
    /// continue. Environment-only sources have nothing to watch and return
    /// `Ok(None)`.
    pub fn run(self) -> Result<Option<RecommendedWatcher>, notify::Error> {
        let Some(path) = self.source.path().map(|p| p.to_path_buf()) else {
            tracing::info!("Configuration comes from the environment, file watching disabled");
            return Ok(None);
        };

        let tx = self.update_tx;
        let source = self.source;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Config file change detected, reloading...");
                        reload_into(&source, &tx);
                    }
                }
                Err(e) => tracing::error!(error = %e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(Some(watcher))
    }
}

/// Load `source` and publish the result, keeping the current config on failure.
pub fn reload_into(source: &ConfigSource, tx: &mpsc::UnboundedSender<ProxyConfig>) {
    match source.load() {
        Ok(new_config) => {
            tracing::info!(endpoints = new_config.endpoints.len(), "Configuration reloaded");
            let _ = tx.send(new_config);
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to reload config. Keeping current configuration.");
        }
    }
}
