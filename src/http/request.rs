//! Inbound upgrade requests and upstream request serialization.
//!
//! # Responsibilities
//! - Parse the client's request head into an `UpgradeRequest`
//! - Detect WebSocket upgrade requests
//! - Serialize the upstream GET request byte-for-byte

use std::net::SocketAddr;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method};

use crate::error::TunnelError;

const MAX_HEADERS: usize = 100;

/// A parsed inbound request, already known to be on a raw socket.
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    /// Request method.
    pub method: Method,
    /// Path component of the request target.
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
    /// Request headers in arrival order.
    pub headers: HeaderMap,
    /// Remote address of the client.
    pub peer: SocketAddr,
}

impl UpgradeRequest {
    /// Parse a complete request head.
    pub fn parse(head: &[u8], peer: SocketAddr) -> Result<Self, TunnelError> {
        let mut storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut storage);

        match req.parse(head) {
            Ok(httparse::Status::Complete(_)) => {}
            Ok(httparse::Status::Partial) => {
                return Err(TunnelError::MalformedHead("incomplete request head".into()))
            }
            Err(e) => return Err(TunnelError::MalformedHead(e.to_string())),
        }

        let method = req
            .method
            .and_then(|m| Method::from_bytes(m.as_bytes()).ok())
            .ok_or_else(|| TunnelError::MalformedHead("invalid method".into()))?;
        let target = req
            .path
            .ok_or_else(|| TunnelError::MalformedHead("missing request target".into()))?;

        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target.to_string(), None),
        };

        Ok(Self {
            method,
            path,
            query,
            headers: to_header_map(req.headers)?,
            peer,
        })
    }

    /// Get a header as a string, if present and valid.
    pub fn header_str(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// True for `GET` requests asking for `Upgrade: websocket`.
    pub fn is_websocket_upgrade(&self) -> bool {
        let upgrade = self
            .header_str(&header::UPGRADE)
            .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("websocket")))
            .unwrap_or(false);
        let connection = self
            .headers
            .get_all(header::CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case("upgrade"));

        self.method == Method::GET && upgrade && connection
    }
}

/// Convert parsed header slots into a `HeaderMap`, keeping repeated names.
pub(crate) fn to_header_map(headers: &[httparse::Header<'_>]) -> Result<HeaderMap, TunnelError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for h in headers {
        let name = HeaderName::from_bytes(h.name.as_bytes())
            .map_err(|_| TunnelError::MalformedHead(format!("invalid header name '{}'", h.name)))?;
        let value = HeaderValue::from_bytes(h.value)
            .map_err(|_| TunnelError::MalformedHead(format!("invalid value for header '{}'", h.name)))?;
        map.append(name, value);
    }
    Ok(map)
}

/// Serialize an HTTP/1.1 request head.
pub fn serialize_request_head(method: &Method, path: &str, headers: &HeaderMap) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(method.as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(path.as_bytes());
    out.extend_from_slice(b" HTTP/1.1\r\n");
    for (name, value) in headers {
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out
}
