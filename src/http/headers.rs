//! Header-extension capability.
//!
//! # Responsibilities
//! - Produce extra upstream headers per request
//! - Add X-Forwarded-For, X-Forwarded-Proto, X-Forwarded-Host
//!
//! # Design Decisions
//! - Extensions are pure functions of the request and the service config,
//!   injected per service rather than read from global state
//! - Extension output has the lowest precedence: static service headers and
//!   the fixed WebSocket headers override it

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::config::ServiceConfig;
use crate::http::request::UpgradeRequest;

/// Computes extra headers for one upstream upgrade request.
pub trait HeaderExtension: Send + Sync {
    fn headers(&self, request: &UpgradeRequest, service: &ServiceConfig) -> HeaderMap;
}

impl<F> HeaderExtension for F
where
    F: Fn(&UpgradeRequest, &ServiceConfig) -> HeaderMap + Send + Sync,
{
    fn headers(&self, request: &UpgradeRequest, service: &ServiceConfig) -> HeaderMap {
        self(request, service)
    }
}

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
static X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
static X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Adds the standard `X-Forwarded-*` headers.
///
/// The client address is appended to any `X-Forwarded-For` chain the client
/// already sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardedHeaders;

impl HeaderExtension for ForwardedHeaders {
    fn headers(&self, request: &UpgradeRequest, _service: &ServiceConfig) -> HeaderMap {
        let mut headers = HeaderMap::new();

        let client_ip = request.peer.ip().to_string();
        let chain = match request.header_str(&X_FORWARDED_FOR) {
            Some(existing) if !existing.trim().is_empty() => format!("{}, {}", existing, client_ip),
            _ => client_ip,
        };
        if let Ok(value) = HeaderValue::from_str(&chain) {
            headers.insert(X_FORWARDED_FOR.clone(), value);
        }

        if let Some(host) = request.headers.get(header::HOST) {
            headers.insert(X_FORWARDED_HOST.clone(), host.clone());
        }
        headers.insert(X_FORWARDED_PROTO.clone(), HeaderValue::from_static("http"));
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(extra: &str) -> UpgradeRequest {
        let head = format!("GET /ws HTTP/1.1\r\nHost: proxy.local\r\n{}\r\n", extra);
        UpgradeRequest::parse(head.as_bytes(), "192.0.2.10:4000".parse().unwrap()).unwrap()
    }

    fn service() -> ServiceConfig {
        toml::from_str(
            r#"
            name = "feed"
            endpoint = "http://127.0.0.1:3000"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn forwarded_headers_from_scratch() {
        let headers = ForwardedHeaders.headers(&request(""), &service());
        assert_eq!(headers["x-forwarded-for"], "192.0.2.10");
        assert_eq!(headers["x-forwarded-host"], "proxy.local");
        assert_eq!(headers["x-forwarded-proto"], "http");
    }

    #[test]
    fn forwarded_for_chain_is_extended() {
        let headers = ForwardedHeaders.headers(&request("X-Forwarded-For: 203.0.113.1\r\n"), &service());
        assert_eq!(headers["x-forwarded-for"], "203.0.113.1, 192.0.2.10");
    }

    #[test]
    fn closures_are_extensions() {
        let ext = |_: &UpgradeRequest, svc: &ServiceConfig| {
            let mut map = HeaderMap::new();
            map.insert("x-service", HeaderValue::from_str(&svc.name).unwrap());
            map
        };
        let headers = ext.headers(&request(""), &service());
        assert_eq!(headers["x-service"], "feed");
    }
}
