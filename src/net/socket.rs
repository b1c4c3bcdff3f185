//! Socket options for long-lived tunnels.

use std::time::Duration;

use socket2::SockRef;
use tokio::net::TcpStream;

/// Prepare a socket for streaming.
///
/// Tokio sockets carry no idle timeout, so only Nagle and keep-alive need
/// touching. Keep-alive uses the system's default idle delay.
pub fn configure_streaming(stream: &TcpStream) -> std::io::Result<()> {
    stream.set_nodelay(true)?;
    SockRef::from(stream).set_keepalive(true)?;
    Ok(())
}

/// Make the next close of this socket send RST instead of FIN.
pub fn reset_on_close(stream: &TcpStream) -> std::io::Result<()> {
    SockRef::from(stream).set_linger(Some(Duration::ZERO))
}
