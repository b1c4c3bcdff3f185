use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::ProxyState;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub active_tunnels: u64,
}

#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub name: String,
    pub path_prefix: String,
    pub host: Option<String>,
    pub endpoint: String,
    pub mode: &'static str,
    pub transform: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct TunnelSummary {
    pub active: u64,
    pub total: u64,
}

pub async fn get_status(State(state): State<Arc<ProxyState>>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        active_tunnels: state.tracker.active_count(),
    })
}

pub async fn get_services(State(state): State<Arc<ProxyState>>) -> Json<Vec<ServiceStatus>> {
    let runtime = state.load();
    let services = runtime
        .router
        .services()
        .map(|svc| {
            let config = svc.config();
            ServiceStatus {
                name: config.name.clone(),
                path_prefix: config.path_prefix.clone(),
                host: config.host.clone(),
                endpoint: config.endpoint.clone(),
                mode: if svc.transform().is_some() { "transform" } else { "passthrough" },
                transform: config.transform.clone(),
                timeout_ms: config.timeout_ms,
            }
        })
        .collect();
    Json(services)
}

pub async fn get_tunnels(State(state): State<Arc<ProxyState>>) -> Json<TunnelSummary> {
    Json(TunnelSummary {
        active: state.tracker.active_count(),
        total: state.tracker.total_count(),
    })
}
