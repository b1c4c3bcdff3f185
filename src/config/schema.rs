//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the WebSocket upgrade proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Upgrade services, each bound to a path prefix and a backend endpoint.
    pub services: Vec<ServiceConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Tunnel buffer sizing.
    pub tunnel: TunnelConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// A WebSocket service: where upgrades for a path go and how they are shaped.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Service identifier for logging/metrics.
    pub name: String,

    /// Backend endpoint URL (e.g., "http://127.0.0.1:3000/base").
    pub endpoint: String,

    /// Path prefix routed to this service.
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,

    /// Host header to match (exact, case-insensitive).
    #[serde(default)]
    pub host: Option<String>,

    /// Remove `path_prefix` from the path forwarded to the backend.
    #[serde(default)]
    pub strip_prefix: bool,

    /// Handshake timeout in milliseconds. `0` disables it.
    #[serde(default)]
    pub timeout_ms: u64,

    /// Query string merged under the client's own query.
    #[serde(default)]
    pub default_query: Option<String>,

    /// Static headers sent with every upstream upgrade request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Name of a registered message transform for backend→client traffic.
    #[serde(default)]
    pub transform: Option<String>,

    /// Add `X-Forwarded-*` headers to the upstream request.
    #[serde(default)]
    pub forwarded_headers: bool,
}

fn default_path_prefix() -> String {
    "/".to_string()
}

/// Timeout configuration for the inbound side and teardown.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for reading the inbound request head, in seconds; 0 disables it.
    pub header_read_secs: u64,

    /// How long the reverse direction may drain after a clean EOF, in milliseconds.
    pub close_grace_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            header_read_secs: 10,
            close_grace_ms: 5_000,
        }
    }
}

/// Tunnel buffer sizing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Read buffer size for raw relays, in bytes.
    pub buffer_size: usize,

    /// Upper bound for request and response heads, in bytes.
    pub max_head_bytes: usize,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            buffer_size: 16 * 1024,
            max_head_bytes: 64 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_service_uses_defaults() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [[services]]
            name = "ticker"
            endpoint = "http://127.0.0.1:3000"
            "#,
        )
        .unwrap();

        let service = &config.services[0];
        assert_eq!(service.path_prefix, "/");
        assert_eq!(service.timeout_ms, 0);
        assert!(service.transform.is_none());
        assert!(service.headers.is_empty());
        assert_eq!(config.listener.max_connections, 10_000);
        assert_eq!(config.tunnel.buffer_size, 16 * 1024);
    }

    #[test]
    fn service_headers_parse_as_table() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [[services]]
            name = "ticker"
            endpoint = "http://127.0.0.1:3000"
            default_query = "a=1"
            transform = "uppercase"
            [services.headers]
            x-service = "ticker"
            "#,
        )
        .unwrap();

        let service = &config.services[0];
        assert_eq!(service.headers.get("x-service").map(String::as_str), Some("ticker"));
        assert_eq!(service.default_query.as_deref(), Some("a=1"));
        assert_eq!(service.transform.as_deref(), Some("uppercase"));
    }
}
