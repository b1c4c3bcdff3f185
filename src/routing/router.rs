//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled services with their matchers
//! - Look up the service for an upgrade request
//! - Compute the upstream path for the matched service
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks, swapped whole on reload)
//! - Longest path prefix wins; config order breaks ties
//! - Explicit `None` rather than a silent default service

use std::sync::Arc;

use crate::config::{ConfigError, ProxyConfig};
use crate::http::request::UpgradeRequest;
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher};
use crate::routing::service::{Capabilities, Service};

/// A service matched to a request.
#[derive(Debug, Clone)]
pub struct ResolvedRoute {
    pub service: Arc<Service>,
    /// Upstream path before the query merge.
    pub target_path: String,
}

#[derive(Debug)]
struct CompiledRoute {
    prefix_len: usize,
    matcher: AndMatcher,
    service: Arc<Service>,
}

/// Immutable service table.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<CompiledRoute>,
}

impl Router {
    /// Compile every service in `config`.
    pub fn from_config(config: &ProxyConfig, caps: &Capabilities) -> Result<Self, ConfigError> {
        let mut errors = Vec::new();
        let mut routes = Vec::with_capacity(config.services.len());

        for svc in &config.services {
            match Service::from_config(svc.clone(), caps) {
                Ok(service) => {
                    let mut matchers: Vec<Box<dyn Matcher>> =
                        vec![Box::new(PathPrefixMatcher::new(svc.path_prefix.clone()))];
                    if let Some(host) = &svc.host {
                        matchers.push(Box::new(HostMatcher::new(host.clone())));
                    }
                    routes.push(CompiledRoute {
                        prefix_len: svc.path_prefix.len(),
                        matcher: AndMatcher::new(matchers),
                        service: Arc::new(service),
                    });
                }
                Err(e) => errors.push(e),
            }
        }
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }

        // Stable sort keeps config order among equal prefixes.
        routes.sort_by(|a, b| b.prefix_len.cmp(&a.prefix_len));

        tracing::debug!(services = routes.len(), "Router compiled");
        Ok(Self { routes })
    }

    /// Find the service for `req`.
    pub fn match_request(&self, req: &UpgradeRequest) -> Option<ResolvedRoute> {
        let route = self.routes.iter().find(|r| r.matcher.matches(req))?;
        let service = Arc::clone(&route.service);
        let target_path = target_path(&service, &req.path);
        Some(ResolvedRoute { service, target_path })
    }

    /// Compiled services, longest prefix first.
    pub fn services(&self) -> impl Iterator<Item = &Arc<Service>> {
        self.routes.iter().map(|r| &r.service)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn target_path(service: &Service, request_path: &str) -> String {
    let config = service.config();
    let rest = if config.strip_prefix {
        request_path
            .strip_prefix(config.path_prefix.trim_end_matches('/'))
            .unwrap_or(request_path)
    } else {
        request_path
    };

    let mut path = String::with_capacity(service.base_path().len() + rest.len() + 1);
    path.push_str(service.base_path());
    if !rest.starts_with('/') {
        path.push('/');
    }
    path.push_str(rest);
    path
}
