//! jq-proxy
//!
//! Routes `POST /proxy/{endpoint}/{path}` to a configured backend and reshapes
//! the backend's JSON response with the jq query carried in the request.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client ──▶ http::server ──▶ http::handlers ──▶ proxy::processor
//!                                                     │
//!               routing::registry ◀── resolve ────────┤
//!               transform::jq     ◀── compile ────────┤
//!               proxy::forwarder  ◀── forward ────────┼──▶ Backend
//!               proxy::decode     ◀── decode ─────────┤
//!               transform::jq     ◀── run + collapse ─┘
//!
//!   config::watcher / SIGHUP ──▶ registry snapshot swap
//! ```

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tokio::net::TcpListener;

use jq_proxy::config::{ConfigSource, ConfigWatcher, LogFormat};
use jq_proxy::http::HttpServer;
use jq_proxy::lifecycle::{signals, Shutdown};
use jq_proxy::observability::{logging, metrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    File,
    Env,
    Hybrid,
}

#[derive(Parser, Debug)]
#[command(name = "jq-proxy", version, about = "HTTP proxy that reshapes backend JSON with jq")]
struct Args {
    /// Configuration file (JSON or TOML)
    #[arg(short, long, default_value = "configs/config.json")]
    config: PathBuf,

    /// Where configuration is read from
    #[arg(long, value_enum, default_value_t = SourceKind::Hybrid)]
    config_source: SourceKind,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the log level
    #[arg(long)]
    log_level: Option<String>,

    /// Override the log format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Do not watch the configuration file for changes
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let source = match args.config_source {
        SourceKind::File => ConfigSource::File(args.config.clone()),
        SourceKind::Env => ConfigSource::Env,
        SourceKind::Hybrid => ConfigSource::Hybrid(args.config.clone()),
    };

    let mut config = source.load()?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.observability.log_level.clone());
    let format = args.log_format.unwrap_or(config.observability.log_format);
    logging::init_tracing(&level, format);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "jq-proxy starting");
    tracing::info!(
        bind_address = %config.server.bind_address(),
        endpoints = config.endpoints.len(),
        upstream_timeout_secs = config.server.upstream_timeout,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(config.server.bind_address()).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let metrics_enabled = config.observability.metrics_enabled;
    let mut server = HttpServer::new(config)?;
    if metrics_enabled {
        server = server.with_metrics(metrics::install_recorder()?);
    }

    let (watcher, config_updates) = ConfigWatcher::new(source.clone());
    let _reloader = signals::spawn_reload_on_sighup(source, watcher.sender())?;
    // Keep the file watcher alive for the life of the server
    let _watch_guard = if args.no_watch {
        tracing::info!("Config file watching disabled");
        None
    } else {
        watcher.run()?
    };

    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();
    shutdown.trigger_on_signal();

    server.run(listener, config_updates, shutdown_rx).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
