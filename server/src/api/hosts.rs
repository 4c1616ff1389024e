use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use fleetmon_core::{
    AllStats, ChannelInfo, ContainerSnapshot, ContainerStats, DiskUsage, Host, HostMetrics,
};

use super::{error_response, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateHostRequest {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub secure: bool,
}

#[derive(Debug, Serialize)]
pub struct HostHealthResponse {
    pub host_id: i64,
    pub healthy: bool,
}

/// GET /api/hosts - list registered hosts
pub async fn list_hosts(State(state): State<Arc<AppState>>) -> Json<Vec<Host>> {
    Json(state.monitor.list_hosts())
}

/// POST /api/hosts - register (or update) a host
pub async fn create_host(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateHostRequest>,
) -> Result<Json<Host>, (StatusCode, String)> {
    info!("Registering host: name={}, address={}", req.name, req.address);

    let host = state
        .monitor
        .add_host(Host {
            id: 0,
            name: req.name,
            address: req.address,
            port: req.port,
            secure: req.secure,
        })
        .await
        .map_err(error_response)?;

    Ok(Json(host))
}

/// GET /api/hosts/:id
pub async fn get_host(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Host>, (StatusCode, String)> {
    state.monitor.get_host(id).map(Json).map_err(error_response)
}

/// DELETE /api/hosts/:id - remove a host and its derived monitoring state
pub async fn delete_host(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, (StatusCode, String)> {
    state.monitor.remove_host(id).await.map_err(error_response)?;
    Ok(StatusCode::OK)
}

/// GET /api/hosts/:id/health - probe one host now
pub async fn host_health(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<HostHealthResponse>, (StatusCode, String)> {
    let healthy = state
        .monitor
        .check_host_health(id)
        .await
        .map_err(error_response)?;
    Ok(Json(HostHealthResponse { host_id: id, healthy }))
}

/// GET /api/health/hosts - probe every host concurrently
pub async fn all_hosts_health(State(state): State<Arc<AppState>>) -> Json<HashMap<i64, bool>> {
    Json(state.monitor.check_all_hosts_health().await)
}

/// GET /api/containers - containers across all reachable hosts
pub async fn all_containers(State(state): State<Arc<AppState>>) -> Json<Vec<ContainerSnapshot>> {
    Json(state.monitor.get_all_containers().await)
}

/// GET /api/hosts/:id/containers
pub async fn host_containers(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ContainerSnapshot>>, (StatusCode, String)> {
    state
        .monitor
        .get_containers_for_host(id)
        .await
        .map(Json)
        .map_err(error_response)
}

/// GET /api/hosts/:id/containers/:container_id
pub async fn inspect_container(
    State(state): State<Arc<AppState>>,
    Path((id, container_id)): Path<(i64, String)>,
) -> Result<Json<ContainerSnapshot>, (StatusCode, String)> {
    state
        .monitor
        .inspect_container(id, &container_id)
        .await
        .map(Json)
        .map_err(error_response)
}

/// GET /api/hosts/:id/stats - per-container stats for one host
pub async fn host_container_stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ContainerStats>>, (StatusCode, String)> {
    state
        .monitor
        .get_container_stats_for_host(id)
        .await
        .map(Json)
        .map_err(error_response)
}

/// GET /api/hosts/:id/metrics
pub async fn host_metrics(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<HostMetrics>, (StatusCode, String)> {
    state
        .monitor
        .get_host_metrics(id)
        .await
        .map(Json)
        .map_err(error_response)
}

/// GET /api/hosts/:id/disk-usage
pub async fn host_disk_usage(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<DiskUsage>, (StatusCode, String)> {
    state
        .monitor
        .get_disk_usage(id)
        .await
        .map(Json)
        .map_err(error_response)
}

/// GET /api/stats - one combined collection cycle
pub async fn all_stats(State(state): State<Arc<AppState>>) -> Json<AllStats> {
    Json(state.monitor.get_all_stats().await)
}

/// GET /api/channels - stream channel catalog
pub async fn channels(State(state): State<Arc<AppState>>) -> Json<Vec<ChannelInfo>> {
    Json(state.monitor.streams().available_channels())
}
