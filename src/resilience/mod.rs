//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Upgrade to backend:
//!     → timeouts.rs (deadline over connect + upstream handshake)
//!     → On timeout: 504 to the client, both sockets closed
//! ```
//!
//! # Design Decisions
//! - Every service may carry a handshake deadline; zero disables it
//! - No retries: an upgrade is a one-shot exchange with side effects

pub mod timeouts;
