//! Per-request upstream handshake parameters.
//!
//! Header precedence, lowest to highest:
//! header extensions → static service headers → fixed WebSocket headers.

use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderValue, Method};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;

use crate::http::query::merge_query;
use crate::http::request::{serialize_request_head, UpgradeRequest};
use crate::routing::Service;

/// Version sent when the client did not name one.
pub const DEFAULT_WS_VERSION: &str = "13";

/// Extension offer sent when the client did not make one.
pub const DEFAULT_WS_EXTENSIONS: &str = "permessage-deflate; client_max_window_bits";

const KEY_BYTES: usize = 24;

/// Immutable description of one upstream upgrade request.
#[derive(Debug, Clone)]
pub struct UpgradeContext {
    pub host: String,
    pub port: u16,
    /// Request target: resolved path plus merged query.
    pub path: String,
    pub headers: HeaderMap,
    /// Connect + handshake deadline; `None` disables it.
    pub timeout: Option<Duration>,
}

impl UpgradeContext {
    /// Resolve the upstream request for `request` against `service`.
    pub fn build(service: &Service, request: &UpgradeRequest, target_path: &str) -> Self {
        let mut headers = HeaderMap::new();
        for extension in service.extensions() {
            headers.extend(extension.headers(request, service.config()));
        }
        headers.extend(service.headers().clone());

        headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(
            header::SEC_WEBSOCKET_VERSION,
            forwarded(request, &header::SEC_WEBSOCKET_VERSION)
                .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_WS_VERSION)),
        );
        headers.insert(
            header::SEC_WEBSOCKET_KEY,
            forwarded(request, &header::SEC_WEBSOCKET_KEY).unwrap_or_else(generate_key_value),
        );

        // Extensions are always sent in passthrough. Transform mode is the one
        // exception: its frame codec cannot inflate, so the offer is stripped
        // and must stay stripped, including any the client sent.
        if service.transform().is_none() {
            headers.insert(
                header::SEC_WEBSOCKET_EXTENSIONS,
                forwarded(request, &header::SEC_WEBSOCKET_EXTENSIONS)
                    .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_WS_EXTENSIONS)),
            );
        } else {
            headers.remove(header::SEC_WEBSOCKET_EXTENSIONS);
        }
        if let Some(protocol) = forwarded(request, &header::SEC_WEBSOCKET_PROTOCOL) {
            headers.insert(header::SEC_WEBSOCKET_PROTOCOL, protocol);
        }

        if let Ok(authority) = HeaderValue::from_str(&authority(service.host(), service.port())) {
            headers.entry(header::HOST).or_insert(authority);
        }

        Self {
            host: service.host().to_string(),
            port: service.port(),
            path: merge_query(target_path, service.default_query(), request.query.as_deref()),
            headers,
            timeout: service.timeout(),
        }
    }

    /// `host:port` to connect to.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Serialized upstream `GET` request head.
    pub fn request_bytes(&self) -> Vec<u8> {
        serialize_request_head(&Method::GET, &self.path, &self.headers)
    }
}

fn forwarded(request: &UpgradeRequest, name: &header::HeaderName) -> Option<HeaderValue> {
    request.headers.get(name).filter(|v| !v.is_empty()).cloned()
}

fn authority(host: &str, port: u16) -> String {
    let host = if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    };
    if port == 80 {
        host
    } else {
        format!("{}:{}", host, port)
    }
}

/// A fresh `Sec-WebSocket-Key`: 24 random bytes, base64 encoded.
pub fn generate_key() -> String {
    let mut raw = [0u8; KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut raw);
    STANDARD.encode(raw)
}

fn generate_key_value() -> HeaderValue {
    // Base64 output is always a valid header value.
    HeaderValue::from_str(&generate_key()).unwrap_or_else(|_| HeaderValue::from_static(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{Capabilities, Service};
    use crate::tunnel::transform::TransformRegistry;

    fn service(extra: &str) -> Service {
        let src = format!(
            "name = \"feed\"\nendpoint = \"http://backend.internal:3000/base\"\n{}",
            extra
        );
        let caps = Capabilities::new(TransformRegistry::with_builtins()).with_extension(
            |_: &UpgradeRequest, _: &crate::config::ServiceConfig| {
                let mut map = HeaderMap::new();
                map.insert("x-layer", HeaderValue::from_static("extension"));
                map.insert("x-static", HeaderValue::from_static("extension"));
                map.insert(header::UPGRADE, HeaderValue::from_static("h2c"));
                map
            },
        );
        Service::from_config(toml::from_str(&src).unwrap(), &caps).unwrap()
    }

    fn request(extra: &str) -> UpgradeRequest {
        let head = format!(
            "GET /ws?b=9 HTTP/1.1\r\nHost: proxy.local\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n{}\r\n",
            extra
        );
        UpgradeRequest::parse(head.as_bytes(), "127.0.0.1:9".parse().unwrap()).unwrap()
    }

    #[test]
    fn fixed_headers_always_present() {
        let ctx = UpgradeContext::build(&service(""), &request(""), "/base/ws");
        assert_eq!(ctx.headers[header::CONNECTION], "Upgrade");
        assert_eq!(ctx.headers[header::UPGRADE], "websocket");
        assert_eq!(ctx.headers[header::SEC_WEBSOCKET_VERSION], DEFAULT_WS_VERSION);
        assert_eq!(ctx.headers[header::SEC_WEBSOCKET_EXTENSIONS], DEFAULT_WS_EXTENSIONS);
        assert_eq!(ctx.headers[header::HOST], "backend.internal:3000");
        assert_eq!(ctx.address(), "backend.internal:3000");
    }

    #[test]
    fn precedence_extension_static_fixed() {
        let svc = service("[headers]\nx-static = \"service\"\n");
        let ctx = UpgradeContext::build(&svc, &request(""), "/base/ws");
        assert_eq!(ctx.headers["x-layer"], "extension");
        assert_eq!(ctx.headers["x-static"], "service");
        assert_eq!(ctx.headers[header::UPGRADE], "websocket");
    }

    #[test]
    fn client_values_are_forwarded() {
        let ctx = UpgradeContext::build(
            &service(""),
            &request(
                "Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
                 Sec-WebSocket-Version: 8\r\n\
                 Sec-WebSocket-Extensions: x-custom\r\n\
                 Sec-WebSocket-Protocol: chat\r\n",
            ),
            "/base/ws",
        );
        assert_eq!(ctx.headers[header::SEC_WEBSOCKET_KEY], "dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(ctx.headers[header::SEC_WEBSOCKET_VERSION], "8");
        assert_eq!(ctx.headers[header::SEC_WEBSOCKET_EXTENSIONS], "x-custom");
        assert_eq!(ctx.headers[header::SEC_WEBSOCKET_PROTOCOL], "chat");
    }

    #[test]
    fn generated_key_is_32_base64_chars() {
        let ctx = UpgradeContext::build(&service(""), &request(""), "/base/ws");
        let key = ctx.headers[header::SEC_WEBSOCKET_KEY].to_str().unwrap();
        assert_eq!(key.len(), 32);
        assert_eq!(STANDARD.decode(key).unwrap().len(), KEY_BYTES);
        assert_ne!(generate_key(), generate_key());
    }

    #[test]
    fn transform_mode_drops_extension_offer() {
        let svc = service("transform = \"uppercase\"\n");
        let ctx = UpgradeContext::build(&svc, &request("Sec-WebSocket-Extensions: permessage-deflate\r\n"), "/p");
        assert!(ctx.headers.get(header::SEC_WEBSOCKET_EXTENSIONS).is_none());
    }

    #[test]
    fn path_merges_default_and_client_query() {
        let svc = service("default_query = \"a=1&b=2&c=3\"\n");
        let ctx = UpgradeContext::build(&svc, &request(""), "/base/ws");
        assert_eq!(ctx.path, "/base/ws?a=1&b=9&c=3");

        let bytes = String::from_utf8(ctx.request_bytes()).unwrap();
        assert!(bytes.starts_with("GET /base/ws?a=1&b=9&c=3 HTTP/1.1\r\n"));
        assert!(bytes.ends_with("\r\n\r\n"));
    }

    #[test]
    fn authority_omits_default_port() {
        assert_eq!(authority("b", 80), "b");
        assert_eq!(authority("b", 8080), "b:8080");
        assert_eq!(authority("::1", 9000), "[::1]:9000");
    }
}
