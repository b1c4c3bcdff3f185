//! Tunnel identity and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique tunnel IDs for tracing
//! - Count active and total tunnels for the admin API and metrics

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::observability::metrics;

/// Global atomic counter for tunnel IDs.
/// Relaxed ordering is enough since we only need uniqueness.
static TUNNEL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for one client connection and its tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TunnelId(u64);

impl TunnelId {
    /// Generate a new unique tunnel ID.
    pub fn new() -> Self {
        Self(TUNNEL_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TunnelId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TunnelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tun-{}", self.0)
    }
}

/// Tracks active tunnels.
#[derive(Debug, Clone, Default)]
pub struct TunnelTracker {
    active: Arc<AtomicU64>,
    total: Arc<AtomicU64>,
}

impl TunnelTracker {
    /// Create a new tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new tunnel. Returns a guard that decrements on drop.
    pub fn track(&self) -> TunnelGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::Relaxed);
        metrics::set_active_tunnels(self.active_count());
        TunnelGuard {
            active: Arc::clone(&self.active),
            id: TunnelId::new(),
        }
    }

    /// Number of tunnels currently open.
    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Number of tunnels opened since start.
    pub fn total_count(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

/// Guard that tracks a tunnel's lifetime.
#[derive(Debug)]
pub struct TunnelGuard {
    active: Arc<AtomicU64>,
    id: TunnelId,
}

impl TunnelGuard {
    /// Get this tunnel's ID.
    pub fn id(&self) -> TunnelId {
        self.id
    }
}

impl Drop for TunnelGuard {
    fn drop(&mut self) {
        let remaining = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_active_tunnels(remaining);
        tracing::trace!(tunnel_id = %self.id, "Tunnel released");
    }
}
