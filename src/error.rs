//! Error taxonomy for the upgrade tunnel.
//!
//! Every variant resolves to a deterministic socket action; none of them is
//! retried inside the proxy. WebSocket clients reconnect on their own.

use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

use crate::tunnel::transform::TransformError;

/// Errors raised while relaying the handshake or running a tunnel.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// Backend unreachable or connection refused.
    #[error("backend connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// Backend did not finish the handshake within the configured window.
    #[error("backend handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// Backend answered the upgrade request without `101 Switching Protocols`.
    #[error("backend refused upgrade with status {status}")]
    HandshakeRejected { status: StatusCode },

    /// An HTTP head could not be parsed.
    #[error("malformed HTTP head: {0}")]
    MalformedHead(String),

    /// An HTTP head exceeded the configured size limit.
    #[error("HTTP head exceeds {0} bytes")]
    HeadTooLarge(usize),

    /// Peer closed the connection before a complete head arrived.
    #[error("connection closed before HTTP head completed")]
    IncompleteHead,

    /// Transport failure on an established socket.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend sent framing that cannot be interpreted.
    #[error("frame decode error: {0}")]
    FrameDecode(#[source] tokio_tungstenite::tungstenite::Error),

    /// User transform failed for a single message.
    #[error(transparent)]
    Transform(#[from] TransformError),
}

impl TunnelError {
    /// Short label used for metrics and the diagnostic written to the client.
    pub fn reason(&self) -> &'static str {
        match self {
            TunnelError::Connect(_) => "connect",
            TunnelError::HandshakeTimeout(_) => "timeout",
            TunnelError::HandshakeRejected { .. } => "rejected",
            TunnelError::MalformedHead(_) => "malformed_head",
            TunnelError::HeadTooLarge(_) => "head_too_large",
            TunnelError::IncompleteHead => "incomplete_head",
            TunnelError::Io(_) => "io",
            TunnelError::FrameDecode(_) => "frame_decode",
            TunnelError::Transform(_) => "transform",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_labels_are_stable() {
        let err = TunnelError::Connect(std::io::Error::from(std::io::ErrorKind::ConnectionRefused));
        assert_eq!(err.reason(), "connect");
        assert_eq!(TunnelError::HandshakeTimeout(Duration::from_secs(1)).reason(), "timeout");
        let rejected = TunnelError::HandshakeRejected { status: StatusCode::FORBIDDEN };
        assert_eq!(rejected.reason(), "rejected");
        assert!(rejected.to_string().contains("403"));
    }
}
