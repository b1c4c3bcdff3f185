//! WebSocket Upgrade Proxy
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                  WS UPGRADE PROXY                     │
//!                    │                                                       │
//!   Client Upgrade   │  ┌─────────┐   ┌─────────┐   ┌─────────┐              │
//!   ─────────────────┼─▶│   net   │──▶│  http   │──▶│ routing │              │
//!                    │  │listener │   │ server  │   │ service │              │
//!                    │  └─────────┘   └─────────┘   └────┬────┘              │
//!                    │                                   ▼                   │
//!                    │                       ┌─────────────────────┐         │
//!                    │                       │ tunnel: handshake   │◀────────┼──▶ Backend
//!   101 + frames     │                       │ manager / pipeline  │         │
//!   ◀────────────────┼───────────────────────┤ transform           │         │
//!                    │                       └─────────────────────┘         │
//!                    │                                                       │
//!                    │  config (+ watcher) · observability · lifecycle ·     │
//!                    │  resilience (deadline) · admin                        │
//!                    └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;

use ws_upgrade_proxy::config::load_config;
use ws_upgrade_proxy::config::watcher::ConfigWatcher;
use ws_upgrade_proxy::net::Listener;
use ws_upgrade_proxy::observability::{logging, metrics};
use ws_upgrade_proxy::{admin, Capabilities, Shutdown, TransformRegistry, UpgradeServer};

#[derive(Debug, Parser)]
#[command(name = "ws-upgrade-proxy", version, about = "WebSocket upgrade reverse proxy")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Reload services when the configuration file changes.
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let transforms = Arc::new(TransformRegistry::with_builtins());
    let config = load_config(&cli.config, &transforms)?;

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ws-upgrade-proxy starting");
    tracing::info!(
        config = %cli.config.display(),
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        services = config.services.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Keep the watcher alive for the lifetime of the server.
    let (_watcher, updates) = if cli.watch {
        let (watcher, updates) = ConfigWatcher::new(&cli.config, Arc::clone(&transforms));
        (Some(watcher.run()?), updates)
    } else {
        let (_tx, updates) = mpsc::unbounded_channel();
        (None, updates)
    };

    let capabilities = Capabilities {
        transforms,
        extensions: Vec::new(),
    };
    let server = UpgradeServer::new(config.clone(), capabilities)?;

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    if config.admin.enabled {
        let admin_listener = tokio::net::TcpListener::bind(&config.admin.bind_address).await?;
        let state = server.state();
        let rx = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = admin::serve(admin_listener, state, rx).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    let listener = Listener::bind(&config.listener).await?;
    server.run(listener, updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
