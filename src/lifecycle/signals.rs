//! OS signal handling.
//!
//! - SIGINT / SIGTERM resolve [`shutdown_signal`]
//! - SIGHUP reloads configuration, never shuts down

use std::future::pending;

use tokio::sync::mpsc;

use crate::config::{ConfigSource, ProxyConfig};

/// Resolve when the process is asked to stop.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

/// Reload `source` into `updates` on every SIGHUP.
#[cfg(unix)]
pub fn spawn_reload_on_sighup(
    source: ConfigSource,
    updates: mpsc::UnboundedSender<ProxyConfig>,
) -> std::io::Result<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    Ok(tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            tracing::info!("SIGHUP received, reloading configuration");
            crate::config::watcher::reload_into(&source, &updates);
        }
    }))
}

/// SIGHUP does not exist here; nothing to spawn.
#[cfg(not(unix))]
pub fn spawn_reload_on_sighup(
    _source: ConfigSource,
    _updates: mpsc::UnboundedSender<ProxyConfig>,
) -> std::io::Result<tokio::task::JoinHandle<()>> {
    Ok(tokio::spawn(async {}))
}
