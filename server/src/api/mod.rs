pub mod hosts;
pub mod ws;

use axum::{
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use fleetmon_core::{FleetMonitor, MonitorError};

pub struct AppState {
    pub monitor: Arc<FleetMonitor>,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Liveness
        .route("/health", get(health))
        // Host management
        .route("/api/hosts", get(hosts::list_hosts).post(hosts::create_host))
        .route("/api/hosts/:id", get(hosts::get_host).delete(hosts::delete_host))
        .route("/api/hosts/:id/health", get(hosts::host_health))
        .route("/api/health/hosts", get(hosts::all_hosts_health))
        // Containers & metrics
        .route("/api/containers", get(hosts::all_containers))
        .route("/api/hosts/:id/containers", get(hosts::host_containers))
        .route("/api/hosts/:id/containers/:container_id", get(hosts::inspect_container))
        .route("/api/hosts/:id/stats", get(hosts::host_container_stats))
        .route("/api/hosts/:id/metrics", get(hosts::host_metrics))
        .route("/api/hosts/:id/disk-usage", get(hosts::host_disk_usage))
        .route("/api/stats", get(hosts::all_stats))
        // Streaming
        .route("/api/channels", get(hosts::channels))
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

/// GET /health - liveness of this server, not of the fleet
async fn health() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Map a monitor error onto the HTTP surface.
pub fn error_response(err: MonitorError) -> (StatusCode, String) {
    let status = match &err {
        MonitorError::HostNotFound(_) | MonitorError::ContainerNotFound(_) => StatusCode::NOT_FOUND,
        MonitorError::Config(_) => StatusCode::BAD_REQUEST,
        MonitorError::Transport(_) => StatusCode::BAD_GATEWAY,
        MonitorError::Engine(_) | MonitorError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}
