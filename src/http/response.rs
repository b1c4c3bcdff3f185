//! Response heads on raw sockets.
//!
//! # Responsibilities
//! - Parse the backend's response to the upgrade request
//! - Serialize the `101 Switching Protocols` head written to the client
//! - Build the short error responses the proxy sends itself
//!
//! # Design Decisions
//! - The client connection is already a raw stream, so every response is
//!   written as bytes rather than through an HTTP server stack
//! - Multi-valued headers become one line per value

use axum::http::{HeaderMap, StatusCode};

use crate::error::TunnelError;
use crate::http::request::to_header_map;

const MAX_HEADERS: usize = 100;

/// Status and headers of a backend response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl ResponseHead {
    /// Parse a complete response head.
    pub fn parse(head: &[u8]) -> Result<Self, TunnelError> {
        let mut storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut res = httparse::Response::new(&mut storage);

        match res.parse(head) {
            Ok(httparse::Status::Complete(_)) => {}
            Ok(httparse::Status::Partial) => {
                return Err(TunnelError::MalformedHead("incomplete response head".into()))
            }
            Err(e) => return Err(TunnelError::MalformedHead(e.to_string())),
        }

        let status = res
            .code
            .and_then(|c| StatusCode::from_u16(c).ok())
            .ok_or_else(|| TunnelError::MalformedHead("invalid status code".into()))?;

        Ok(Self {
            status,
            headers: to_header_map(res.headers)?,
        })
    }

    /// True when the backend accepted the upgrade.
    pub fn is_switching_protocols(&self) -> bool {
        self.status == StatusCode::SWITCHING_PROTOCOLS
    }
}

/// Serialize a status line and header block, terminated by the blank line.
pub fn serialize_response_head(status: StatusCode, headers: &HeaderMap) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(b"HTTP/1.1 ");
    out.extend_from_slice(status.as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(status.canonical_reason().unwrap_or("").as_bytes());
    out.extend_from_slice(b"\r\n");
    for (name, value) in headers {
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out
}

/// The head relayed to the client once the backend has upgraded.
pub fn switching_protocols(backend_headers: &HeaderMap) -> Vec<u8> {
    serialize_response_head(StatusCode::SWITCHING_PROTOCOLS, backend_headers)
}

/// A complete plain-text response that closes the connection.
pub fn plain_response(status: StatusCode, body: &str) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status.as_str(),
        status.canonical_reason().unwrap_or(""),
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(body.as_bytes());
    out
}
