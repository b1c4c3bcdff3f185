//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check service endpoints, prefixes and headers
//! - Check that named transforms are registered
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function of the config and the transform registry

use std::collections::HashSet;

use axum::http::{HeaderName, HeaderValue};
use url::Url;

use crate::config::schema::ProxyConfig;
use crate::tunnel::transform::TransformRegistry;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// Human readable description.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration against the available transforms.
pub fn validate_config(
    config: &ProxyConfig,
    transforms: &TransformRegistry,
) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }
    if config.tunnel.buffer_size == 0 {
        errors.push(ValidationError::new("tunnel.buffer_size", "must be greater than 0"));
    }
    if config.tunnel.max_head_bytes < 1024 {
        errors.push(ValidationError::new("tunnel.max_head_bytes", "must be at least 1024"));
    }

    let mut names = HashSet::new();
    for (i, service) in config.services.iter().enumerate() {
        let field = |name: &str| format!("services[{}].{}", i, name);

        if service.name.is_empty() {
            errors.push(ValidationError::new(field("name"), "must not be empty"));
        } else if !names.insert(service.name.as_str()) {
            errors.push(ValidationError::new(
                field("name"),
                format!("duplicate service name '{}'", service.name),
            ));
        }

        match Url::parse(&service.endpoint) {
            Ok(url) => {
                if !matches!(url.scheme(), "http" | "ws") {
                    errors.push(ValidationError::new(
                        field("endpoint"),
                        format!("unsupported scheme '{}'", url.scheme()),
                    ));
                }
                if url.host_str().is_none() {
                    errors.push(ValidationError::new(field("endpoint"), "missing host"));
                }
            }
            Err(e) => errors.push(ValidationError::new(field("endpoint"), e.to_string())),
        }

        if !service.path_prefix.starts_with('/') {
            errors.push(ValidationError::new(field("path_prefix"), "must start with '/'"));
        }

        for (name, value) in &service.headers {
            if HeaderName::from_bytes(name.as_bytes()).is_err() {
                errors.push(ValidationError::new(
                    field("headers"),
                    format!("invalid header name '{}'", name),
                ));
            }
            if HeaderValue::from_str(value).is_err() {
                errors.push(ValidationError::new(
                    field("headers"),
                    format!("invalid value for header '{}'", name),
                ));
            }
        }

        if let Some(transform) = &service.transform {
            if transforms.get(transform).is_none() {
                errors.push(ValidationError::new(
                    field("transform"),
                    format!("unknown transform '{}'", transform),
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ServiceConfig;

    fn service(name: &str, endpoint: &str) -> ServiceConfig {
        ServiceConfig {
            name: name.into(),
            endpoint: endpoint.into(),
            path_prefix: "/ws".into(),
            host: None,
            strip_prefix: false,
            timeout_ms: 0,
            default_query: None,
            headers: Default::default(),
            transform: None,
            forwarded_headers: false,
        }
    }

    #[test]
    fn default_config_is_valid() {
        let registry = TransformRegistry::with_builtins();
        assert!(validate_config(&ProxyConfig::default(), &registry).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let registry = TransformRegistry::with_builtins();
        let mut config = ProxyConfig::default();
        let mut bad = service("a", "ftp://files.example.com");
        bad.path_prefix = "ws".into();
        bad.transform = Some("nope".into());
        config.services.push(bad);
        config.services.push(service("a", "http://127.0.0.1:1"));

        let errors = validate_config(&config, &registry).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"services[0].endpoint"));
        assert!(fields.contains(&"services[0].path_prefix"));
        assert!(fields.contains(&"services[0].transform"));
        assert!(fields.contains(&"services[1].name"));
    }

    #[test]
    fn rejects_invalid_header_name() {
        let registry = TransformRegistry::with_builtins();
        let mut config = ProxyConfig::default();
        let mut svc = service("a", "http://127.0.0.1:1");
        svc.headers.insert("bad header".into(), "v".into());
        config.services.push(svc);

        let errors = validate_config(&config, &registry).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("bad header"));
    }
}
