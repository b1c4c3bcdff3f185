//! Tunnel Manager.
//!
//! # Responsibilities
//! - Own both sockets of a tunnel after the handshake
//! - Relay bytes (passthrough) or hand backend→client to the pipeline
//! - Couple termination so neither side outlives the other
//!
//! # Teardown
//! - Error on either side: both sockets closed gracefully (FIN)
//! - Backend close frame / end of stream: both closed gracefully
//! - Clean end of stream in passthrough: FIN forwarded, the other direction
//!   gets `close_grace` to finish, then both closed
//! - Undecodable backend framing: both sockets reset (RST)

use std::io;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::net::socket::reset_on_close;
use crate::observability::metrics;
use crate::tunnel::io::Rewind;
use crate::tunnel::pipeline::{MessagePipeline, PipelineExit};
use crate::tunnel::transform::TransformFunction;

/// Tunnel tuning shared by every tunnel.
#[derive(Debug, Clone, Copy)]
pub struct TunnelSettings {
    /// Relay read buffer size.
    pub buffer_size: usize,
    /// How long the other direction may run after a clean end of stream.
    pub close_grace: Duration,
    /// Upper bound for HTTP heads on either side.
    pub max_head_bytes: usize,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            buffer_size: 16 * 1024,
            close_grace: Duration::from_secs(5),
            max_head_bytes: 64 * 1024,
        }
    }
}

/// The two live sockets of one tunnel.
#[derive(Debug)]
pub struct TunnelPair {
    pub client: TcpStream,
    /// Bytes the client sent past its request head.
    pub client_prefix: Bytes,
    pub backend: TcpStream,
    /// Bytes the backend sent past its `101` head.
    pub backend_prefix: Bytes,
}

/// How a tunnel's sockets were closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// Write sides shut down, then closed.
    Graceful,
    /// Reset without a FIN.
    Destroy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Upstream,
    Downstream,
}

impl Direction {
    fn label(self) -> &'static str {
        match self {
            Direction::Upstream => metrics::UPSTREAM,
            Direction::Downstream => metrics::DOWNSTREAM,
        }
    }
}

/// How one relay direction ended.
#[derive(Debug)]
enum RelayEnd {
    /// Reader reached end of stream; the writer was shut down.
    Eof,
    ReadFailed(io::Error),
    WriteFailed(io::Error),
}

/// Copy `reader` into `writer` until either side ends.
///
/// Each chunk is fully written before the next read, so a slow writer
/// pauses reading and a drained writer resumes it.
async fn relay<R, W>(reader: &mut R, writer: &mut W, buffer_size: usize, direction: Direction) -> RelayEnd
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buffer_size];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                let _ = writer.shutdown().await;
                return RelayEnd::Eof;
            }
            Ok(n) => n,
            Err(e) => return RelayEnd::ReadFailed(e),
        };
        if let Err(e) = writer.write_all(&buf[..n]).await {
            return RelayEnd::WriteFailed(e);
        }
        metrics::record_bytes(direction.label(), n as u64);
    }
}

/// Runs one tunnel to completion.
pub struct TunnelManager {
    settings: TunnelSettings,
    transform: Option<TransformFunction>,
}

impl TunnelManager {
    /// `transform` selects transform mode; `None` is passthrough.
    pub fn new(settings: TunnelSettings, transform: Option<TransformFunction>) -> Self {
        Self { settings, transform }
    }

    /// Relay until the tunnel ends and close both sockets.
    pub async fn run(&self, pair: TunnelPair) -> Teardown {
        let (client_read, mut client_write) = pair.client.into_split();
        let (backend_read, mut backend_write) = pair.backend.into_split();
        let mut client_read = Rewind::new(client_read, pair.client_prefix);
        let mut backend_read = Rewind::new(backend_read, pair.backend_prefix);

        let teardown = match &self.transform {
            None => {
                self.passthrough(&mut client_read, &mut client_write, &mut backend_read, &mut backend_write)
                    .await
            }
            Some(transform) => {
                self.transformed(
                    transform.clone(),
                    &mut client_read,
                    &mut client_write,
                    &mut backend_read,
                    &mut backend_write,
                )
                .await
            }
        };

        match teardown {
            Teardown::Graceful => {
                let _ = client_write.shutdown().await;
                let _ = backend_write.shutdown().await;
            }
            Teardown::Destroy => {
                destroy(client_read.into_inner(), client_write);
                destroy(backend_read.into_inner(), backend_write);
            }
        }
        teardown
    }

    async fn passthrough(
        &self,
        client_read: &mut Rewind<OwnedReadHalf>,
        client_write: &mut OwnedWriteHalf,
        backend_read: &mut Rewind<OwnedReadHalf>,
        backend_write: &mut OwnedWriteHalf,
    ) -> Teardown {
        let size = self.settings.buffer_size;
        let upstream = relay(client_read, backend_write, size, Direction::Upstream);
        let downstream = relay(backend_read, client_write, size, Direction::Downstream);
        tokio::pin!(upstream, downstream);

        let (first, end) = tokio::select! {
            end = &mut upstream => (Direction::Upstream, end),
            end = &mut downstream => (Direction::Downstream, end),
        };
        tracing::debug!(direction = first.label(), end = ?end, "Relay direction finished");

        if let RelayEnd::Eof = end {
            let other = match first {
                Direction::Upstream => downstream,
                Direction::Downstream => upstream,
            };
            match tokio::time::timeout(self.settings.close_grace, other).await {
                Ok(end) => tracing::debug!(end = ?end, "Relay drained"),
                Err(_) => tracing::debug!(grace = ?self.settings.close_grace, "Close grace elapsed"),
            }
        }
        Teardown::Graceful
    }

    async fn transformed(
        &self,
        transform: TransformFunction,
        client_read: &mut Rewind<OwnedReadHalf>,
        client_write: &mut OwnedWriteHalf,
        backend_read: &mut Rewind<OwnedReadHalf>,
        backend_write: &mut OwnedWriteHalf,
    ) -> Teardown {
        let upstream = relay(client_read, backend_write, self.settings.buffer_size, Direction::Upstream);
        let downstream = MessagePipeline::new(backend_read, client_write, transform).await.run();
        tokio::pin!(upstream, downstream);

        tokio::select! {
            end = &mut upstream => {
                tracing::debug!(end = ?end, "Client side finished");
                Teardown::Graceful
            }
            exit = &mut downstream => match exit {
                PipelineExit::DecodeFailed(e) => {
                    tracing::warn!(error = %e, "Undecodable backend frame, resetting tunnel");
                    Teardown::Destroy
                }
                other => {
                    tracing::debug!(exit = ?other, "Backend side finished");
                    Teardown::Graceful
                }
            },
        }
    }
}

/// Close a socket with RST.
fn destroy(read: OwnedReadHalf, write: OwnedWriteHalf) {
    match read.reunite(write) {
        Ok(stream) => {
            if let Err(e) = reset_on_close(&stream) {
                tracing::debug!(error = %e, "Failed to arm socket reset");
            }
        }
        Err(e) => tracing::debug!(error = %e, "Socket halves did not match"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio::net::TcpListener;

    use crate::tunnel::transform::Uppercase;

    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let connect = TcpStream::connect(listener.local_addr().unwrap());
        let (accepted, connected) = tokio::join!(listener.accept(), connect);
        (accepted.unwrap().0, connected.unwrap())
    }

    /// Returns (client peer, backend peer, tunnel task).
    async fn tunnel(
        transform: Option<TransformFunction>,
        client_prefix: &'static [u8],
        backend_prefix: &'static [u8],
    ) -> (TcpStream, TcpStream, tokio::task::JoinHandle<Teardown>) {
        let (client_peer, client) = socket_pair().await;
        let (backend_peer, backend) = socket_pair().await;
        let settings = TunnelSettings {
            close_grace: Duration::from_millis(200),
            ..TunnelSettings::default()
        };
        let task = tokio::spawn(async move {
            TunnelManager::new(settings, transform)
                .run(TunnelPair {
                    client,
                    client_prefix: Bytes::from_static(client_prefix),
                    backend,
                    backend_prefix: Bytes::from_static(backend_prefix),
                })
                .await
        });
        (client_peer, backend_peer, task)
    }

    #[tokio::test]
    async fn passthrough_is_byte_exact_with_prefixes() {
        let (mut client, mut backend, _task) = tunnel(None, b"c0", b"b0").await;

        client.write_all(b"\x00\x01up").await.unwrap();
        let mut buf = [0u8; 6];
        backend.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"c0\x00\x01up");

        backend.write_all(b"down\xff").await.unwrap();
        let mut buf = [0u8; 7];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"b0down\xff");
    }

    #[tokio::test]
    async fn client_eof_closes_backend() {
        let (client, mut backend, task) = tunnel(None, b"", b"").await;
        drop(client);

        let mut buf = [0u8; 8];
        let n = backend.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
        assert_eq!(task.await.unwrap(), Teardown::Graceful);
    }

    #[tokio::test]
    async fn transform_mode_client_eof_closes_backend() {
        let (client, mut backend, task) = tunnel(Some(Arc::new(Uppercase)), b"", b"").await;
        drop(client);

        let mut buf = [0u8; 8];
        let n = backend.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
        assert_eq!(task.await.unwrap(), Teardown::Graceful);
    }

    #[tokio::test]
    async fn transform_mode_upstream_resumes_after_backend_stall() {
        const TOTAL: usize = 32 * 1024 * 1024;
        let (mut client, mut backend, _task) = tunnel(Some(Arc::new(Uppercase)), b"", b"").await;

        let writer = tokio::spawn(async move {
            let chunk = vec![0x5Au8; 64 * 1024];
            for _ in 0..TOTAL / chunk.len() {
                client.write_all(&chunk).await.unwrap();
            }
            client
        });

        // Nothing is read while the writer fills every buffer on the path.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!writer.is_finished());

        let mut received = 0usize;
        let mut buf = vec![0u8; 64 * 1024];
        while received < TOTAL {
            let n = backend.read(&mut buf).await.unwrap();
            assert!(n > 0, "backend stream ended after {} bytes", received);
            assert!(buf[..n].iter().all(|b| *b == 0x5A));
            received += n;
        }
        assert_eq!(received, TOTAL);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn backend_reset_closes_client() {
        let (mut client, backend, task) = tunnel(None, b"", b"").await;
        reset_on_close(&backend).unwrap();
        drop(backend);

        let mut buf = [0u8; 8];
        let read = tokio::time::timeout(Duration::from_secs(5), client.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
        assert_eq!(task.await.unwrap(), Teardown::Graceful);
    }

    #[tokio::test]
    async fn transform_mode_decode_error_destroys_both() {
        let (mut client, mut backend, task) = tunnel(Some(Arc::new(Uppercase)), b"", b"").await;
        backend.write_all(&[0xFF; 64]).await.unwrap();

        assert_eq!(task.await.unwrap(), Teardown::Destroy);

        let mut buf = [0u8; 8];
        let read = tokio::time::timeout(Duration::from_secs(5), client.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
    }
}
