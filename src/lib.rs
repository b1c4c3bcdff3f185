//! WebSocket upgrade reverse proxy.
//!
//! Intercepts HTTP Upgrade requests for configured WebSocket services,
//! performs the equivalent upgrade against the backend and keeps a live
//! tunnel between the two sockets. Backend→client messages can optionally be
//! decoded, transformed and re-encoded in flight.

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod net;
pub mod routing;
pub mod tunnel;

// Cross-cutting concerns
pub mod admin;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::ProxyConfig;
pub use error::TunnelError;
pub use http::UpgradeServer;
pub use lifecycle::Shutdown;
pub use routing::Capabilities;
pub use tunnel::{Transform, TransformError, TransformRegistry, WsMessage};
