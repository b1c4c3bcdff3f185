//! Route matching logic.
//!
//! # Responsibilities
//! - Match host header (exact match, case-insensitive)
//! - Match path prefix (case-sensitive, on segment boundaries)
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Host matching is case-insensitive, port ignored
//! - Path matching is case-sensitive
//! - Empty condition = always matches (wildcard)

use axum::http::header;

use crate::http::request::UpgradeRequest;

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &UpgradeRequest) -> bool;
}

/// Matches the Host header.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    expected_host: String,
}

impl HostMatcher {
    /// The host is normalized to lowercase for case-insensitive matching.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            expected_host: host.into().to_lowercase(),
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, req: &UpgradeRequest) -> bool {
        req.header_str(&header::HOST)
            .map(|h| {
                let name = h.rsplit_once(':').map(|(name, _)| name).unwrap_or(h);
                name.eq_ignore_ascii_case(&self.expected_host)
            })
            .unwrap_or(false)
    }
}

/// Matches the request path prefix.
///
/// `/ws` matches `/ws` and `/ws/feed` but not `/wsx`.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, req: &UpgradeRequest) -> bool {
        let path = req.path.as_str();
        if !path.starts_with(&self.prefix) {
            return false;
        }
        self.prefix.ends_with('/')
            || path.len() == self.prefix.len()
            || path.as_bytes()[self.prefix.len()] == b'/'
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, req: &UpgradeRequest) -> bool {
        self.matchers.iter().all(|m| m.matches(req))
    }
}
