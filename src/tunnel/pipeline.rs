//! Message Transform Pipeline.
//!
//! Decodes backend frames, runs application messages through the service's
//! transform, and re-encodes them toward the client. Control frames bypass
//! the transform: pings are forwarded as pings, pongs as pongs.
//!
//! ```text
//! backend bytes → decoder (client role) → FrameEvent
//!     Message  → transform → encoder (server role) → client
//!     Ping     → Ping  → client
//!     Pong     → Pong  → client
//!     Close    → Close → client, pipeline ends (graceful)
//!     End      → pipeline ends (graceful)
//!     DecodeError      → pipeline ends (sockets destroyed)
//! ```

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, Empty, Sink};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Role};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

use crate::observability::metrics;
use crate::tunnel::io::Joined;
use crate::tunnel::transform::{apply_guarded, TransformFunction, WsMessage};

/// One decoded unit from the backend.
#[derive(Debug)]
pub enum FrameEvent {
    Message(WsMessage),
    Ping(Bytes),
    Pong(Bytes),
    /// Close frame, with or without a payload.
    Close(Option<CloseFrame>),
    /// End of stream without a close frame.
    End,
    DecodeError(WsError),
    SocketError(std::io::Error),
}

impl FrameEvent {
    /// Classify an item from the decoder; `None` means nothing to act on.
    pub fn from_item(item: Option<Result<Message, WsError>>) -> Option<Self> {
        let message = match item {
            None => return Some(FrameEvent::End),
            Some(Ok(message)) => message,
            Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => return Some(FrameEvent::End),
            Some(Err(WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake))) => {
                return Some(FrameEvent::End)
            }
            Some(Err(WsError::Io(e))) => return Some(FrameEvent::SocketError(e)),
            Some(Err(e)) => return Some(FrameEvent::DecodeError(e)),
        };

        match message {
            Message::Ping(payload) => Some(FrameEvent::Ping(payload)),
            Message::Pong(payload) => Some(FrameEvent::Pong(payload)),
            Message::Close(frame) => Some(FrameEvent::Close(frame)),
            Message::Frame(_) => None,
            other => WsMessage::from_frame(other).map(FrameEvent::Message),
        }
    }
}

/// Why the pipeline stopped.
#[derive(Debug)]
pub enum PipelineExit {
    /// Backend closed the WebSocket (or the stream ended).
    Closed,
    /// Backend framing could not be decoded.
    DecodeFailed(WsError),
    /// Reading from the backend failed.
    BackendError(std::io::Error),
    /// Writing to the client failed.
    ClientError(WsError),
}

/// Backend→client message pipeline for one tunnel.
pub struct MessagePipeline<R, W> {
    decoder: WebSocketStream<Joined<R, Sink>>,
    encoder: WebSocketStream<Joined<Empty, W>>,
    transform: TransformFunction,
}

impl<R, W> MessagePipeline<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wire a decoder over `backend` and an encoder over `client`.
    ///
    /// Replies the decoder would send on its own (pongs, close echoes) are
    /// discarded; the client answers the backend through the raw upstream
    /// direction instead.
    pub async fn new(backend: R, client: W, transform: TransformFunction) -> Self {
        let decoder =
            WebSocketStream::from_raw_socket(Joined::new(backend, tokio::io::sink()), Role::Client, None).await;
        let encoder =
            WebSocketStream::from_raw_socket(Joined::new(tokio::io::empty(), client), Role::Server, None).await;
        Self {
            decoder,
            encoder,
            transform,
        }
    }

    /// Process backend frames until the stream ends or fails.
    pub async fn run(mut self) -> PipelineExit {
        loop {
            let Some(event) = FrameEvent::from_item(self.decoder.next().await) else {
                continue;
            };

            let outbound = match event {
                FrameEvent::Message(message) => match apply_guarded(self.transform.as_ref(), message) {
                    Ok(transformed) => {
                        metrics::record_bytes(metrics::DOWNSTREAM, transformed.as_bytes().len() as u64);
                        transformed.into_frame()
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Transform failed, message dropped");
                        metrics::record_transform_error();
                        continue;
                    }
                },
                FrameEvent::Ping(payload) => Message::Ping(payload),
                FrameEvent::Pong(payload) => Message::Pong(payload),
                FrameEvent::Close(frame) => {
                    if let Err(e) = self.encoder.send(Message::Close(frame)).await {
                        tracing::debug!(error = %e, "Failed to forward close frame");
                    }
                    return PipelineExit::Closed;
                }
                FrameEvent::End => return PipelineExit::Closed,
                FrameEvent::DecodeError(e) => return PipelineExit::DecodeFailed(e),
                FrameEvent::SocketError(e) => return PipelineExit::BackendError(e),
            };

            if let Err(e) = self.encoder.send(outbound).await {
                return PipelineExit::ClientError(e);
            }
        }
    }
}
