//! Upgrade server: accept loop and per-connection dispatch.
//!
//! # Responsibilities
//! - Accept connections within the connection limit
//! - Read and parse the request head under a deadline
//! - Reject non-upgrade (400) and unrouted (404) requests
//! - Hand routed upgrades to the tunnel
//! - Swap in reloaded configuration without touching open tunnels
//!
//! # Design Decisions
//! - The client socket is raw from the first byte; no HTTP server stack sits
//!   in front of the tunnel
//! - Runtime state is swapped whole (`ArcSwap`); a connection keeps the
//!   snapshot it started with

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::http::StatusCode;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tracing::Instrument;

use crate::config::{ConfigError, ProxyConfig};
use crate::error::TunnelError;
use crate::http::head::read_head;
use crate::http::request::UpgradeRequest;
use crate::http::response::plain_response;
use crate::net::{Listener, ListenerError, TunnelTracker};
use crate::resilience::timeouts::{deadline_from_secs, with_deadline};
use crate::routing::{Capabilities, Router};
use crate::tunnel::{proxy_upgrade, TunnelSettings};

/// One consistent view of configuration and the services compiled from it.
#[derive(Debug)]
pub struct RuntimeState {
    pub config: ProxyConfig,
    pub router: Router,
}

impl RuntimeState {
    pub fn tunnel_settings(&self) -> TunnelSettings {
        TunnelSettings {
            buffer_size: self.config.tunnel.buffer_size,
            close_grace: Duration::from_millis(self.config.timeouts.close_grace_ms),
            max_head_bytes: self.config.tunnel.max_head_bytes,
        }
    }

    /// `None` when `header_read_secs` is zero.
    pub fn header_read_timeout(&self) -> Option<Duration> {
        deadline_from_secs(self.config.timeouts.header_read_secs)
    }
}

/// State shared by the accept loop, connection tasks and the admin API.
pub struct ProxyState {
    inner: ArcSwap<RuntimeState>,
    capabilities: Capabilities,
    pub tracker: TunnelTracker,
    pub started_at: Instant,
}

impl ProxyState {
    pub fn new(config: ProxyConfig, capabilities: Capabilities) -> Result<Self, ConfigError> {
        let router = Router::from_config(&config, &capabilities)?;
        Ok(Self {
            inner: ArcSwap::from_pointee(RuntimeState { config, router }),
            capabilities,
            tracker: TunnelTracker::new(),
            started_at: Instant::now(),
        })
    }

    /// Current snapshot.
    pub fn load(&self) -> Arc<RuntimeState> {
        self.inner.load_full()
    }

    /// Compile `config` and make it current.
    pub fn reload(&self, config: ProxyConfig) -> Result<(), ConfigError> {
        let router = Router::from_config(&config, &self.capabilities)?;
        let services = router.len();
        self.inner.store(Arc::new(RuntimeState { config, router }));
        tracing::info!(services, "Configuration reloaded");
        Ok(())
    }
}

/// Accepts clients and turns routed upgrade requests into tunnels.
pub struct UpgradeServer {
    state: Arc<ProxyState>,
}

impl UpgradeServer {
    pub fn new(config: ProxyConfig, capabilities: Capabilities) -> Result<Self, ConfigError> {
        Ok(Self {
            state: Arc::new(ProxyState::new(config, capabilities)?),
        })
    }

    pub fn state(&self) -> Arc<ProxyState> {
        Arc::clone(&self.state)
    }

    /// Accept until `shutdown` fires.
    ///
    /// Validated configs arriving on `updates` replace the service table.
    pub async fn run(
        self,
        listener: Listener,
        mut updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        let mut reload_open = true;
        tracing::info!(
            address = ?listener.local_addr().ok(),
            services = self.state.load().router.len(),
            "Upgrade server starting"
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            handle_connection(state, stream, peer).await;
                            drop(permit);
                        });
                    }
                    Err(ListenerError::Accept(e)) => {
                        tracing::warn!(error = %e, "Accept failed");
                    }
                    Err(e) => return Err(e),
                },
                update = updates.recv(), if reload_open => match update {
                    Some(config) => {
                        if let Err(e) = self.state.reload(config) {
                            tracing::error!(error = %e, "Reloaded configuration rejected");
                        }
                    }
                    None => reload_open = false,
                },
                _ = shutdown.recv() => {
                    tracing::info!(
                        active_tunnels = self.state.tracker.active_count(),
                        "Shutdown signal received, no longer accepting"
                    );
                    break;
                }
            }
        }
        Ok(())
    }
}

async fn respond(stream: &mut TcpStream, status: StatusCode, body: &str) {
    if let Err(e) = stream.write_all(&plain_response(status, body)).await {
        tracing::debug!(error = %e, "Failed to write response");
    }
    let _ = stream.shutdown().await;
}

async fn handle_connection(state: Arc<ProxyState>, mut stream: TcpStream, peer: SocketAddr) {
    let runtime = state.load();
    let settings = runtime.tunnel_settings();

    let read = with_deadline(
        runtime.header_read_timeout(),
        read_head(&mut stream, settings.max_head_bytes),
    )
    .await;
    let (head, rest) = match read {
        Ok(Ok(parts)) => parts,
        Ok(Err(TunnelError::HeadTooLarge(limit))) => {
            tracing::debug!(peer = %peer, limit, "Request head too large");
            respond(&mut stream, StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE, "request head too large").await;
            return;
        }
        Ok(Err(e)) => {
            tracing::debug!(peer = %peer, error = %e, "Connection closed before request head");
            return;
        }
        Err(e) => {
            tracing::debug!(peer = %peer, error = %e, "Request head timed out");
            respond(&mut stream, StatusCode::REQUEST_TIMEOUT, "request timeout").await;
            return;
        }
    };

    let request = match UpgradeRequest::parse(&head, peer) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(peer = %peer, error = %e, "Malformed request");
            respond(&mut stream, StatusCode::BAD_REQUEST, "malformed request").await;
            return;
        }
    };
    if !request.is_websocket_upgrade() {
        tracing::debug!(peer = %peer, method = %request.method, path = %request.path, "Not a WebSocket upgrade");
        respond(&mut stream, StatusCode::BAD_REQUEST, "websocket upgrade required").await;
        return;
    }

    let Some(route) = runtime.router.match_request(&request) else {
        tracing::warn!(peer = %peer, path = %request.path, "No service matched");
        respond(&mut stream, StatusCode::NOT_FOUND, "no matching service").await;
        return;
    };
    drop(runtime);

    let guard = state.tracker.track();
    let span = tracing::info_span!(
        "tunnel",
        tunnel_id = %guard.id(),
        service = %route.service.name(),
        peer = %peer,
        path = %request.path,
    );

    async {
        match proxy_upgrade(stream, rest, &request, &route, settings).await {
            Ok(teardown) => tracing::info!(teardown = ?teardown, "Tunnel closed"),
            Err(e) => tracing::warn!(error = %e, reason = e.reason(), "Upgrade failed"),
        }
    }
    .instrument(span)
    .await;
    drop(guard);
}
