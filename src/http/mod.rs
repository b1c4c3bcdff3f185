//! HTTP/1.1 handling on raw sockets.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (accept, dispatch)
//!     → head.rs (read head, keep trailing bytes)
//!     → request.rs (parse, detect upgrade)
//!     → [routing picks the service]
//!     → query.rs + headers.rs (shape the upstream request)
//!     → response.rs (101 / rejection / diagnostics back to the client)
//! ```

pub mod head;
pub mod headers;
pub mod query;
pub mod request;
pub mod response;
pub mod server;

pub use headers::{ForwardedHeaders, HeaderExtension};
pub use request::UpgradeRequest;
pub use server::{ProxyState, UpgradeServer};
