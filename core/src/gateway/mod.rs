pub mod http;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{ContainerSnapshot, DiskUsage, Host};

pub use http::{HttpEngineGateway, HttpGatewayProvider};

/// Resource numbers for one container, already reduced to what the data
/// model carries. The engine-specific raw payload never leaves the gateway.
#[derive(Debug, Clone, Default)]
pub struct StatsSample {
    pub cpu_usage_percent: f64,
    pub memory_usage_bytes: u64,
    pub memory_limit_bytes: u64,
    pub network_rx_bytes: u64,
    pub network_tx_bytes: u64,
}

/// Static facts about one engine host, from its info endpoint.
#[derive(Debug, Clone)]
pub struct EngineInfo {
    pub host_name: String,
    pub engine_version: String,
    pub os: String,
    pub architecture: String,
    pub total_memory_bytes: u64,
    pub total_cpus: u32,
    pub container_count: u32,
    pub running_container_count: u32,
    pub image_count: u32,
}

/// Per-host client for the container engine's API.
///
/// Every call is a network round trip and may fail with a transport error
/// (unreachable, timeout) or a not-found error; callers own retry and
/// partial-failure policy.
#[async_trait]
pub trait EngineGateway: Send + Sync {
    /// Cheapest liveness probe the engine offers.
    async fn ping(&self) -> Result<()>;

    /// All containers on the host, any state.
    async fn list_containers(&self) -> Result<Vec<ContainerSnapshot>>;

    async fn inspect_container(&self, container_id: &str) -> Result<ContainerSnapshot>;

    /// One non-streaming stats sample for a container.
    async fn container_stats(&self, container_id: &str) -> Result<StatsSample>;

    async fn system_info(&self) -> Result<EngineInfo>;

    async fn disk_usage(&self) -> Result<DiskUsage>;
}

/// Maps a registered host to its gateway. Implementations may cache clients;
/// `invalidate` drops whatever is cached for a removed or updated host.
pub trait GatewayProvider: Send + Sync {
    fn gateway_for(&self, host: &Host) -> Result<Arc<dyn EngineGateway>>;

    fn invalidate(&self, _host_id: i64) {}
}
