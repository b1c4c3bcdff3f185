//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming upgrade request (host, path)
//!     → router.rs (longest prefix lookup)
//!     → matcher.rs (evaluate host and path conditions)
//!     → Return: ResolvedRoute (service + upstream path) or None
//!
//! Service compilation (at startup and on reload):
//!     ServiceConfig[]
//!     → service.rs (resolve endpoint, headers, transform)
//!     → Sort by prefix length
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Services compiled up front, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same service

pub mod matcher;
pub mod router;
pub mod service;

pub use router::{ResolvedRoute, Router};
pub use service::{Capabilities, Service};
