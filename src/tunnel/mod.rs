//! WebSocket upgrade tunnel.
//!
//! # Data Flow
//! ```text
//! Client upgrade request (already routed)
//!     → context.rs (upstream headers, path, deadline)
//!     → handshake.rs (backend GET + 101 relayed to client)
//!     → manager.rs (owns both sockets until teardown)
//!         passthrough: raw bytes both ways
//!         transform:   client → backend raw,
//!                      backend → pipeline.rs → transform.rs → client
//! ```
//!
//! # Design Decisions
//! - One task per tunnel; no state shared between tunnels except transforms
//! - Bytes read past either HTTP head are re-injected (io.rs), never dropped
//! - Every error ends in a socket action, never a panic

pub mod context;
pub mod handshake;
pub mod io;
pub mod manager;
pub mod pipeline;
pub mod transform;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::error::TunnelError;
use crate::http::request::UpgradeRequest;
use crate::net::socket::configure_streaming;
use crate::observability::metrics;
use crate::routing::ResolvedRoute;

pub use context::UpgradeContext;
pub use handshake::{BackendUpgrade, HandshakeRelay};
pub use manager::{Teardown, TunnelManager, TunnelPair, TunnelSettings};
pub use transform::{Transform, TransformError, TransformFunction, TransformRegistry, WsMessage};

/// Take over a routed client connection: relay the handshake, then run the
/// tunnel until it closes.
///
/// `client_prefix` holds bytes the client sent past its request head.
pub async fn proxy_upgrade(
    mut client: TcpStream,
    client_prefix: Bytes,
    request: &UpgradeRequest,
    route: &ResolvedRoute,
    settings: TunnelSettings,
) -> Result<Teardown, TunnelError> {
    if let Err(e) = configure_streaming(&client) {
        tracing::debug!(error = %e, "Failed to configure client socket");
    }

    let ctx = UpgradeContext::build(&route.service, request, &route.target_path);
    tracing::debug!(backend = %ctx.address(), path = %ctx.path, "Relaying upgrade");

    let backend = match HandshakeRelay::new(&ctx, settings.max_head_bytes)
        .relay(&mut client)
        .await
    {
        Ok(backend) => backend,
        Err(e) => {
            metrics::record_handshake_failure(e.reason());
            let _ = client.shutdown().await;
            return Err(e);
        }
    };

    if let Err(e) = configure_streaming(&backend.stream) {
        tracing::debug!(error = %e, "Failed to configure backend socket");
    }
    metrics::record_tunnel_opened(route.service.name());
    tracing::info!(
        backend = %ctx.address(),
        mode = if route.service.transform().is_some() { "transform" } else { "passthrough" },
        "Tunnel established"
    );

    let teardown = TunnelManager::new(settings, route.service.transform().cloned())
        .run(TunnelPair {
            client,
            client_prefix,
            backend: backend.stream,
            backend_prefix: backend.rest,
        })
        .await;
    Ok(teardown)
}
