//! Admin API tests.

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use ws_upgrade_proxy::admin;
use ws_upgrade_proxy::config::ProxyConfig;

mod common;

use common::*;

async fn get(addr: std::net::SocketAddr, path: &str, token: Option<&str>) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let auth = token
        .map(|t| format!("Authorization: Bearer {}\r\n", t))
        .unwrap_or_default();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: admin\r\n{}Connection: close\r\n\r\n",
        path, auth
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    read_to_close(&mut stream).await
}

#[tokio::test]
async fn admin_requires_bearer_token_and_reports_services() {
    let backend = start_ws_echo_backend().await;
    let mut config = ProxyConfig::default();
    config.admin.api_key = "secret".into();
    config.services.push(service("echo", backend, "/echo"));
    let proxy = start_proxy_with(config).await;

    let admin_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let admin_addr = admin_listener.local_addr().unwrap();
    tokio::spawn(admin::serve(
        admin_listener,
        proxy.state.clone(),
        proxy.shutdown.subscribe(),
    ));

    let denied = get(admin_addr, "/admin/status", None).await;
    assert!(denied.starts_with("HTTP/1.1 401"));
    let wrong = get(admin_addr, "/admin/status", Some("nope")).await;
    assert!(wrong.starts_with("HTTP/1.1 401"));

    let status = get(admin_addr, "/admin/status", Some("secret")).await;
    assert!(status.starts_with("HTTP/1.1 200"));
    assert!(status.contains("\"status\":\"operational\""));

    let services = get(admin_addr, "/admin/services", Some("secret")).await;
    assert!(services.contains("\"name\":\"echo\""));
    assert!(services.contains("\"mode\":\"passthrough\""));

    let tunnels = get(admin_addr, "/admin/tunnels", Some("secret")).await;
    assert!(tunnels.contains("\"active\":0"));
}
