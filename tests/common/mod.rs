//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use ws_upgrade_proxy::config::{ProxyConfig, ServiceConfig};
use ws_upgrade_proxy::http::ProxyState;
use ws_upgrade_proxy::net::Listener;
use ws_upgrade_proxy::{Capabilities, Shutdown, TransformRegistry, UpgradeServer};

/// A proxy running on an ephemeral loopback port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub state: Arc<ProxyState>,
    pub shutdown: Shutdown,
    pub updates: mpsc::UnboundedSender<ProxyConfig>,
}

/// Start a proxy serving `services`.
pub async fn start_proxy(services: Vec<ServiceConfig>) -> TestProxy {
    let mut config = ProxyConfig::default();
    config.services = services;
    config.timeouts.close_grace_ms = 200;
    start_proxy_with(config).await
}

pub async fn start_proxy_with(config: ProxyConfig) -> TestProxy {
    let inner = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let listener = Listener::from_listener(inner, 64).unwrap();
    let addr = listener.local_addr().unwrap();

    let server =
        UpgradeServer::new(config, Capabilities::new(TransformRegistry::with_builtins())).unwrap();
    let state = server.state();
    let shutdown = Shutdown::new();
    let (updates, rx) = mpsc::unbounded_channel();
    let stop = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx, stop).await;
    });

    TestProxy {
        addr,
        state,
        shutdown,
        updates,
    }
}

/// A service definition with every optional feature off.
pub fn service(name: &str, backend: SocketAddr, path_prefix: &str) -> ServiceConfig {
    ServiceConfig {
        name: name.to_string(),
        endpoint: format!("http://{}", backend),
        path_prefix: path_prefix.to_string(),
        host: None,
        strip_prefix: false,
        timeout_ms: 0,
        default_query: None,
        headers: BTreeMap::new(),
        transform: None,
        forwarded_headers: false,
    }
}

/// A backend that completes WebSocket handshakes and echoes every message.
pub async fn start_ws_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(socket).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    if msg.is_text() || msg.is_binary() {
                        if ws.send(msg).await.is_err() {
                            break;
                        }
                    }
                }
            });
        }
    });
    addr
}

/// A backend that completes one WebSocket handshake and sends `script`.
pub async fn start_ws_script_backend(script: Vec<Message>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
        for msg in script {
            ws.send(msg).await.unwrap();
        }
        // Keep reading so pongs and close replies are consumed.
        while let Some(Ok(_)) = ws.next().await {}
    });
    addr
}

/// A raw backend for one connection.
///
/// It reads the upstream request head, answers with `response`, and hands
/// back the head it received together with the socket.
pub async fn start_raw_backend(response: &'static [u8]) -> (SocketAddr, oneshot::Receiver<(String, TcpStream)>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let (head, _) = read_head(&mut socket).await;
        socket.write_all(response).await.unwrap();
        let _ = tx.send((head, socket));
    });
    (addr, rx)
}

/// A backend that accepts and then says nothing.
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub const BACKEND_101: &[u8] =
    b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n";

/// Upgrade request for `path`; `extra` is a block of `Name: value\r\n` lines.
pub fn upgrade_request(path: &str, extra: &str) -> String {
    format!(
        "GET {} HTTP/1.1\r\nHost: proxy.test\r\nConnection: Upgrade\r\nUpgrade: websocket\r\nSec-WebSocket-Version: 13\r\n{}\r\n",
        path, extra
    )
}

/// Read up to the blank line; returns the head and any bytes read past it.
pub async fn read_head(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let rest = buf.split_off(pos + 4);
            return (String::from_utf8(buf).unwrap(), rest);
        }
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "stream ended before head completed");
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Read everything until the peer closes.
pub async fn read_to_close(stream: &mut TcpStream) -> String {
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut out))
        .await
        .expect("peer did not close")
        .unwrap();
    String::from_utf8_lossy(&out).into_owned()
}

/// True once the peer has closed or reset the connection.
pub async fn wait_closed(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 256];
    let deadline = Duration::from_secs(5);
    loop {
        match tokio::time::timeout(deadline, stream.read(&mut buf)).await {
            Ok(Ok(0)) | Ok(Err(_)) => return true,
            Ok(Ok(_)) => continue,
            Err(_) => return false,
        }
    }
}
