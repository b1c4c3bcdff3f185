//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (tunnel id, active tunnel tracking)
//!     → socket.rs (no-delay, keep-alive, reset-on-close)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each tunnel tracked for the admin API
//! - Socket options are applied to both halves of a tunnel

pub mod connection;
pub mod listener;
pub mod socket;

pub use connection::{TunnelGuard, TunnelId, TunnelTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
