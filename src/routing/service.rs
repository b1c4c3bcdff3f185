//! Compiled services.
//!
//! A `Service` is a `ServiceConfig` with everything resolved up front: the
//! backend endpoint split into host, port and base path, the default query
//! decoded, static headers converted, and the transform looked up.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::config::validation::ValidationError;
use crate::config::ServiceConfig;
use crate::http::headers::{ForwardedHeaders, HeaderExtension};
use crate::http::query::parse_query;
use crate::resilience::timeouts::deadline_from_millis;
use crate::tunnel::transform::{TransformFunction, TransformRegistry};

/// Pluggable behaviour shared by every service.
#[derive(Clone, Default)]
pub struct Capabilities {
    /// Transforms services may name in their config.
    pub transforms: Arc<TransformRegistry>,
    /// Extensions applied to every service, in order.
    pub extensions: Vec<Arc<dyn HeaderExtension>>,
}

impl Capabilities {
    pub fn new(transforms: TransformRegistry) -> Self {
        Self {
            transforms: Arc::new(transforms),
            extensions: Vec::new(),
        }
    }

    /// Add a header extension applied to every service.
    pub fn with_extension(mut self, extension: impl HeaderExtension + 'static) -> Self {
        self.extensions.push(Arc::new(extension));
        self
    }
}

/// A WebSocket service ready to accept upgrades.
pub struct Service {
    config: ServiceConfig,
    host: String,
    port: u16,
    base_path: String,
    default_query: Vec<(String, String)>,
    headers: HeaderMap,
    extensions: Vec<Arc<dyn HeaderExtension>>,
    transform: Option<TransformFunction>,
    timeout: Option<Duration>,
}

impl Service {
    /// Compile a service from its configuration.
    pub fn from_config(config: ServiceConfig, caps: &Capabilities) -> Result<Self, ValidationError> {
        let invalid = |message: String| ValidationError {
            field: format!("services.{}", config.name),
            message,
        };

        let endpoint = Url::parse(&config.endpoint).map_err(|e| invalid(e.to_string()))?;
        let host = endpoint
            .host_str()
            .ok_or_else(|| invalid("endpoint has no host".into()))?
            .to_string();
        let port = endpoint.port_or_known_default().unwrap_or(80);
        let base_path = endpoint.path().trim_end_matches('/').to_string();

        let mut headers = HeaderMap::with_capacity(config.headers.len());
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
            let value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
            headers.insert(name, value);
        }

        let transform = match &config.transform {
            Some(name) => Some(
                caps.transforms
                    .get(name)
                    .ok_or_else(|| invalid(format!("unknown transform '{}'", name)))?,
            ),
            None => None,
        };

        let mut extensions = caps.extensions.clone();
        if config.forwarded_headers {
            extensions.insert(0, Arc::new(ForwardedHeaders));
        }

        Ok(Self {
            default_query: config.default_query.as_deref().map(parse_query).unwrap_or_default(),
            timeout: deadline_from_millis(config.timeout_ms),
            host,
            port,
            base_path,
            headers,
            extensions,
            transform,
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Backend host name or address.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Endpoint path without a trailing slash (may be empty).
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn default_query(&self) -> &[(String, String)] {
        &self.default_query
    }

    /// Static per-service headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn extensions(&self) -> &[Arc<dyn HeaderExtension>] {
        &self.extensions
    }

    pub fn transform(&self) -> Option<&TransformFunction> {
        self.transform.as_ref()
    }

    /// Handshake deadline; `None` when disabled.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.config.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("base_path", &self.base_path)
            .field("transform", &self.config.transform)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(toml_src: &str) -> ServiceConfig {
        toml::from_str(toml_src).unwrap()
    }

    #[test]
    fn endpoint_is_split() {
        let svc = Service::from_config(
            config(
                r#"
                name = "feed"
                endpoint = "http://backend.internal:3000/base/"
                default_query = "a=1&b=2"
                timeout_ms = 250
                "#,
            ),
            &Capabilities::new(TransformRegistry::with_builtins()),
        )
        .unwrap();

        assert_eq!(svc.host(), "backend.internal");
        assert_eq!(svc.port(), 3000);
        assert_eq!(svc.base_path(), "/base");
        assert_eq!(svc.default_query().len(), 2);
        assert_eq!(svc.timeout(), Some(Duration::from_millis(250)));
        assert!(svc.transform().is_none());
    }

    #[test]
    fn default_port_and_no_timeout() {
        let svc = Service::from_config(
            config(
                r#"
                name = "feed"
                endpoint = "ws://backend.internal"
                transform = "uppercase"
                forwarded_headers = true
                "#,
            ),
            &Capabilities::new(TransformRegistry::with_builtins()),
        )
        .unwrap();

        assert_eq!(svc.port(), 80);
        assert_eq!(svc.base_path(), "");
        assert_eq!(svc.timeout(), None);
        assert!(svc.transform().is_some());
        assert_eq!(svc.extensions().len(), 1);
    }

    #[test]
    fn unknown_transform_fails() {
        let err = Service::from_config(
            config(
                r#"
                name = "feed"
                endpoint = "http://b"
                transform = "missing"
                "#,
            ),
            &Capabilities::new(TransformRegistry::new()),
        )
        .unwrap_err();
        assert!(err.message.contains("missing"));
    }
}
