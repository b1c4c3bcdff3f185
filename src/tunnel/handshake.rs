//! Handshake Relay.
//!
//! # Responsibilities
//! - Connect to the backend and send the upstream upgrade request
//! - Read the backend's response head, keeping any bytes flushed past it
//! - Write the `101 Switching Protocols` head to the client
//! - On failure, answer the client with a short diagnostic
//!
//! # Design Decisions
//! - Connect + request + response share one deadline; `None` waits forever
//! - Nothing is retried; WebSocket clients reconnect themselves

use axum::http::StatusCode;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::error::TunnelError;
use crate::http::head::read_head;
use crate::http::response::{plain_response, serialize_response_head, switching_protocols, ResponseHead};
use crate::resilience::timeouts::{with_deadline, DeadlineExceeded};
use crate::tunnel::context::UpgradeContext;

/// Body written to the client when the backend cannot be reached.
pub const CONNECT_ERROR_BODY: &str = "ws request error";
/// Body written to the client when the handshake deadline elapses.
pub const TIMEOUT_BODY: &str = "ws request timeout";

/// The backend's answer to the upgrade request.
#[derive(Debug)]
pub struct BackendResponse {
    pub stream: TcpStream,
    pub head: ResponseHead,
    /// Bytes the backend sent past its response head.
    pub rest: Bytes,
}

/// A backend socket that has switched protocols.
#[derive(Debug)]
pub struct BackendUpgrade {
    pub stream: TcpStream,
    /// First bytes of the backend's application stream.
    pub rest: Bytes,
}

/// Performs the upstream handshake for one client.
pub struct HandshakeRelay<'a> {
    ctx: &'a UpgradeContext,
    max_head_bytes: usize,
}

impl<'a> HandshakeRelay<'a> {
    pub fn new(ctx: &'a UpgradeContext, max_head_bytes: usize) -> Self {
        Self { ctx, max_head_bytes }
    }

    /// Connect, send the upgrade request and read the response head.
    pub async fn connect(&self) -> Result<BackendResponse, TunnelError> {
        let exchange = async {
            let mut stream = TcpStream::connect(self.ctx.address())
                .await
                .map_err(TunnelError::Connect)?;
            stream
                .write_all(&self.ctx.request_bytes())
                .await
                .map_err(TunnelError::Connect)?;

            let (head, rest) = read_head(&mut stream, self.max_head_bytes).await?;
            let head = ResponseHead::parse(&head)?;
            Ok::<_, TunnelError>(BackendResponse { stream, head, rest })
        };

        with_deadline(self.ctx.timeout, exchange)
            .await
            .map_err(|DeadlineExceeded(limit)| TunnelError::HandshakeTimeout(limit))?
    }

    /// Run the handshake and answer the client.
    ///
    /// On success the client has received the `101` head and the backend
    /// socket is returned. On failure the client has received either the
    /// backend's own rejection or a diagnostic, and the caller only has to
    /// close it.
    pub async fn relay(&self, client: &mut TcpStream) -> Result<BackendUpgrade, TunnelError> {
        match self.connect().await {
            Ok(response) if response.head.is_switching_protocols() => {
                client
                    .write_all(&switching_protocols(&response.head.headers))
                    .await?;
                tracing::debug!(
                    backend = %self.ctx.address(),
                    early_bytes = response.rest.len(),
                    "Backend switched protocols"
                );
                Ok(BackendUpgrade {
                    stream: response.stream,
                    rest: response.rest,
                })
            }
            Ok(mut response) => {
                let status = response.head.status;
                let mut out = serialize_response_head(status, &response.head.headers);
                out.extend_from_slice(&response.rest);
                if let Err(e) = client.write_all(&out).await {
                    tracing::debug!(error = %e, "Failed to relay backend rejection");
                }
                let _ = response.stream.shutdown().await;
                Err(TunnelError::HandshakeRejected { status })
            }
            Err(err) => {
                let diagnostic = match err {
                    TunnelError::HandshakeTimeout(_) => plain_response(StatusCode::GATEWAY_TIMEOUT, TIMEOUT_BODY),
                    _ => plain_response(StatusCode::BAD_GATEWAY, CONNECT_ERROR_BODY),
                };
                if let Err(e) = client.write_all(&diagnostic).await {
                    tracing::debug!(error = %e, "Failed to write handshake diagnostic");
                }
                Err(err)
            }
        }
    }
}
