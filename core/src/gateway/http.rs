use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;

use crate::error::{MonitorError, Result};
use crate::gateway::{EngineGateway, EngineInfo, GatewayProvider, StatsSample};
use crate::types::{ContainerSnapshot, ContainerState, DiskUsage, Host, PortMapping};

// ============================================================================
// Raw engine API payloads
// ============================================================================

/// Container list entry (GET /containers/json).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiContainerSummary {
    id: String,
    #[serde(default)]
    names: Vec<String>,
    #[serde(default)]
    image: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    created: i64,
    #[serde(default)]
    ports: Vec<ApiPort>,
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiPort {
    private_port: u16,
    #[serde(default)]
    public_port: Option<u16>,
    #[serde(rename = "Type", default)]
    protocol: String,
}

/// Container inspect payload (GET /containers/{id}/json), trimmed to the
/// fields the snapshot needs.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiContainerInspect {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    created: String,
    #[serde(default)]
    config: Option<ApiContainerConfig>,
    #[serde(default)]
    state: Option<ApiContainerInspectState>,
    #[serde(default)]
    network_settings: Option<ApiNetworkSettings>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiContainerConfig {
    #[serde(default)]
    image: String,
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiContainerInspectState {
    #[serde(default)]
    status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiNetworkSettings {
    /// Keyed by "port/proto", e.g. "80/tcp"; value is the host bindings.
    #[serde(default)]
    ports: Option<HashMap<String, Option<Vec<ApiPortBinding>>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiPortBinding {
    #[serde(default)]
    host_port: String,
}

/// Stats payload (GET /containers/{id}/stats?stream=false). The engine keeps
/// these keys snake_case, unlike the rest of its API.
#[derive(Debug, Clone, Default, Deserialize)]
struct ApiStats {
    #[serde(default)]
    cpu_stats: ApiCpuStats,
    #[serde(default)]
    precpu_stats: ApiCpuStats,
    #[serde(default)]
    memory_stats: ApiMemoryStats,
    #[serde(default)]
    networks: Option<HashMap<String, ApiNetworkStats>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ApiCpuStats {
    #[serde(default)]
    cpu_usage: ApiCpuUsage,
    #[serde(default)]
    system_cpu_usage: Option<u64>,
    #[serde(default)]
    online_cpus: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ApiCpuUsage {
    #[serde(default)]
    total_usage: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ApiMemoryStats {
    #[serde(default)]
    usage: u64,
    #[serde(default)]
    limit: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ApiNetworkStats {
    #[serde(default)]
    rx_bytes: u64,
    #[serde(default)]
    tx_bytes: u64,
}

/// System info payload (GET /info).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiInfo {
    #[serde(default)]
    name: String,
    #[serde(default)]
    server_version: String,
    #[serde(default)]
    operating_system: String,
    #[serde(default)]
    architecture: String,
    #[serde(default)]
    mem_total: u64,
    #[serde(rename = "NCPU", default)]
    ncpu: u32,
    #[serde(default)]
    containers: u32,
    #[serde(default)]
    containers_running: u32,
    #[serde(default)]
    images: u32,
}

/// Disk usage payload (GET /system/df).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiDiskUsage {
    #[serde(default)]
    layers_size: u64,
    #[serde(default)]
    images: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    containers: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    volumes: Option<Vec<serde_json::Value>>,
}

// ============================================================================
// Conversions
// ============================================================================

fn clean_name(names: &[String], id: &str) -> String {
    names
        .first()
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_else(|| id.chars().take(12).collect())
}

fn summary_to_snapshot(host_id: i64, raw: ApiContainerSummary) -> ContainerSnapshot {
    let name = clean_name(&raw.names, &raw.id);
    ContainerSnapshot {
        name,
        host_id,
        state: ContainerState::from_engine(&raw.state),
        ports: raw
            .ports
            .into_iter()
            .map(|p| PortMapping {
                private_port: p.private_port,
                public_port: p.public_port,
                protocol: p.protocol,
            })
            .collect(),
        labels: raw.labels.unwrap_or_default(),
        created_at: raw.created,
        image: raw.image,
        id: raw.id,
    }
}

/// "80/tcp" -> (80, "tcp")
fn parse_port_key(key: &str) -> Option<(u16, String)> {
    let (port, proto) = key.split_once('/')?;
    Some((port.parse().ok()?, proto.to_string()))
}

fn inspect_to_snapshot(host_id: i64, raw: ApiContainerInspect) -> ContainerSnapshot {
    let config = raw.config.unwrap_or_default();
    let state = raw.state.unwrap_or_default();

    let mut ports = Vec::new();
    if let Some(map) = raw.network_settings.and_then(|n| n.ports) {
        for (key, bindings) in map {
            let Some((private_port, protocol)) = parse_port_key(&key) else {
                continue;
            };
            let public_port = bindings
                .as_deref()
                .and_then(|b| b.first())
                .and_then(|b| b.host_port.parse().ok());
            ports.push(PortMapping {
                private_port,
                public_port,
                protocol,
            });
        }
    }
    ports.sort_by_key(|p| p.private_port);

    let created_at = OffsetDateTime::parse(&raw.created, &Rfc3339)
        .map(|t| t.unix_timestamp())
        .unwrap_or(0);

    ContainerSnapshot {
        id: raw.id,
        host_id,
        name: raw.name.trim_start_matches('/').to_string(),
        image: config.image,
        state: ContainerState::from_engine(&state.status),
        ports,
        labels: config.labels.unwrap_or_default(),
        created_at,
    }
}

/// CPU usage percent from the engine's delta counters.
fn compute_cpu_percent(stats: &ApiStats) -> f64 {
    let cpu_delta = stats
        .cpu_stats
        .cpu_usage
        .total_usage
        .saturating_sub(stats.precpu_stats.cpu_usage.total_usage);
    let system_delta = stats
        .cpu_stats
        .system_cpu_usage
        .unwrap_or(0)
        .saturating_sub(stats.precpu_stats.system_cpu_usage.unwrap_or(0));
    let online_cpus = f64::from(stats.cpu_stats.online_cpus.unwrap_or(1));

    if system_delta > 0 && cpu_delta > 0 {
        (cpu_delta as f64 / system_delta as f64) * online_cpus * 100.0
    } else {
        0.0
    }
}

fn stats_to_sample(stats: ApiStats) -> StatsSample {
    let cpu_usage_percent = compute_cpu_percent(&stats);
    let (rx, tx) = stats
        .networks
        .unwrap_or_default()
        .values()
        .fold((0u64, 0u64), |(rx, tx), net| {
            (rx + net.rx_bytes, tx + net.tx_bytes)
        });

    StatsSample {
        cpu_usage_percent,
        memory_usage_bytes: stats.memory_stats.usage,
        memory_limit_bytes: stats.memory_stats.limit,
        network_rx_bytes: rx,
        network_tx_bytes: tx,
    }
}

// ============================================================================
// Gateway
// ============================================================================

/// `EngineGateway` over the engine's HTTP API for one host.
pub struct HttpEngineGateway {
    host_id: i64,
    base_url: Url,
    client: reqwest::Client,
}

impl HttpEngineGateway {
    pub fn new(host: &Host, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(&format!(
            "{}://{}:{}",
            host.scheme(),
            host.address,
            host.effective_port()
        ))
        .map_err(|e| MonitorError::Config(format!("invalid host address: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            host_id: host.id,
            base_url,
            client,
        })
    }

    fn url(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(path);
        url
    }

    /// GET `path`, mapping connection/timeout failures to `Transport` and
    /// non-2xx statuses to `ContainerNotFound`/`Engine`.
    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<reqwest::Response> {
        let url = self.url(path);
        debug!(host_id = self.host_id, %url, "engine request");
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(MonitorError::transport)?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            Err(MonitorError::ContainerNotFound(path.to_string()))
        } else {
            Err(MonitorError::Engine(format!("{path} failed ({status}): {body}")))
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        self.get(path, query)
            .await?
            .json::<T>()
            .await
            .map_err(|e| MonitorError::Engine(format!("failed to decode {path}: {e}")))
    }
}

#[async_trait]
impl EngineGateway for HttpEngineGateway {
    async fn ping(&self) -> Result<()> {
        self.get("/_ping", &[]).await.map(|_| ())
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSnapshot>> {
        let raw: Vec<ApiContainerSummary> =
            self.get_json("/containers/json", &[("all", "true")]).await?;
        Ok(raw
            .into_iter()
            .map(|c| summary_to_snapshot(self.host_id, c))
            .collect())
    }

    async fn inspect_container(&self, container_id: &str) -> Result<ContainerSnapshot> {
        let raw: ApiContainerInspect = self
            .get_json(&format!("/containers/{container_id}/json"), &[])
            .await
            .map_err(|e| match e {
                MonitorError::ContainerNotFound(_) => {
                    MonitorError::ContainerNotFound(container_id.to_string())
                }
                other => other,
            })?;
        Ok(inspect_to_snapshot(self.host_id, raw))
    }

    async fn container_stats(&self, container_id: &str) -> Result<StatsSample> {
        let raw: ApiStats = self
            .get_json(
                &format!("/containers/{container_id}/stats"),
                &[("stream", "false")],
            )
            .await
            .map_err(|e| match e {
                MonitorError::ContainerNotFound(_) => {
                    MonitorError::ContainerNotFound(container_id.to_string())
                }
                other => other,
            })?;
        Ok(stats_to_sample(raw))
    }

    async fn system_info(&self) -> Result<EngineInfo> {
        let raw: ApiInfo = self.get_json("/info", &[]).await?;
        Ok(EngineInfo {
            host_name: raw.name,
            engine_version: raw.server_version,
            os: raw.operating_system,
            architecture: raw.architecture,
            total_memory_bytes: raw.mem_total,
            total_cpus: raw.ncpu,
            container_count: raw.containers,
            running_container_count: raw.containers_running,
            image_count: raw.images,
        })
    }

    async fn disk_usage(&self) -> Result<DiskUsage> {
        let raw: ApiDiskUsage = self.get_json("/system/df", &[]).await?;
        Ok(DiskUsage {
            host_id: self.host_id,
            layers_size_bytes: raw.layers_size,
            image_count: raw.images.map(|v| v.len() as u32).unwrap_or(0),
            container_count: raw.containers.map(|v| v.len() as u32).unwrap_or(0),
            volume_count: raw.volumes.map(|v| v.len() as u32).unwrap_or(0),
        })
    }
}

/// Caches one `HttpEngineGateway` per host; rebuilt when the host record
/// changes, dropped on `invalidate`.
pub struct HttpGatewayProvider {
    timeout: Duration,
    cache: Mutex<HashMap<i64, (Host, Arc<HttpEngineGateway>)>>,
}

impl HttpGatewayProvider {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl GatewayProvider for HttpGatewayProvider {
    fn gateway_for(&self, host: &Host) -> Result<Arc<dyn EngineGateway>> {
        let mut cache = self.cache.lock().expect("gateway cache lock poisoned");
        if let Some((cached_host, gateway)) = cache.get(&host.id) {
            if cached_host == host {
                return Ok(gateway.clone());
            }
        }
        let gateway = Arc::new(HttpEngineGateway::new(host, self.timeout)?);
        cache.insert(host.id, (host.clone(), gateway.clone()));
        Ok(gateway)
    }

    fn invalidate(&self, host_id: i64) {
        self.cache
            .lock()
            .expect("gateway cache lock poisoned")
            .remove(&host_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_percent_from_deltas() {
        let stats = ApiStats {
            cpu_stats: ApiCpuStats {
                cpu_usage: ApiCpuUsage { total_usage: 400 },
                system_cpu_usage: Some(2000),
                online_cpus: Some(4),
            },
            precpu_stats: ApiCpuStats {
                cpu_usage: ApiCpuUsage { total_usage: 200 },
                system_cpu_usage: Some(1000),
                online_cpus: Some(4),
            },
            ..Default::default()
        };
        // (200 / 1000) * 4 cpus * 100 = 80%
        assert!((compute_cpu_percent(&stats) - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cpu_percent_zero_without_deltas() {
        assert_eq!(compute_cpu_percent(&ApiStats::default()), 0.0);
    }

    #[test]
    fn sample_sums_networks() {
        let mut networks = HashMap::new();
        networks.insert(
            "eth0".to_string(),
            ApiNetworkStats {
                rx_bytes: 100,
                tx_bytes: 10,
            },
        );
        networks.insert(
            "eth1".to_string(),
            ApiNetworkStats {
                rx_bytes: 50,
                tx_bytes: 5,
            },
        );
        let sample = stats_to_sample(ApiStats {
            memory_stats: ApiMemoryStats {
                usage: 1024,
                limit: 4096,
            },
            networks: Some(networks),
            ..Default::default()
        });
        assert_eq!(sample.network_rx_bytes, 150);
        assert_eq!(sample.network_tx_bytes, 15);
        assert_eq!(sample.memory_usage_bytes, 1024);
        assert_eq!(sample.memory_limit_bytes, 4096);
    }

    #[test]
    fn list_payload_decodes_to_snapshot() {
        let json = r#"[{
            "Id": "abcdef123456",
            "Names": ["/web-1"],
            "Image": "nginx:latest",
            "State": "running",
            "Created": 1700000000,
            "Ports": [{"PrivatePort": 80, "PublicPort": 8080, "Type": "tcp"}],
            "Labels": {"com.example.stack": "web"}
        }]"#;
        let raw: Vec<ApiContainerSummary> = serde_json::from_str(json).unwrap();
        let snapshot = summary_to_snapshot(3, raw.into_iter().next().unwrap());
        assert_eq!(snapshot.host_id, 3);
        assert_eq!(snapshot.name, "web-1");
        assert_eq!(snapshot.state, ContainerState::Running);
        assert_eq!(snapshot.ports.len(), 1);
        assert_eq!(snapshot.ports[0].public_port, Some(8080));
        assert_eq!(snapshot.labels["com.example.stack"], "web");
    }

    #[test]
    fn inspect_payload_decodes_to_snapshot() {
        let json = r#"{
            "Id": "abcdef123456",
            "Name": "/db-1",
            "Created": "2024-01-15T10:30:00.000000000Z",
            "Config": {"Image": "postgres:16", "Labels": {}},
            "State": {"Status": "running"},
            "NetworkSettings": {"Ports": {"5432/tcp": [{"HostIp": "0.0.0.0", "HostPort": "15432"}], "9000/tcp": null}}
        }"#;
        let raw: ApiContainerInspect = serde_json::from_str(json).unwrap();
        let snapshot = inspect_to_snapshot(1, raw);
        assert_eq!(snapshot.name, "db-1");
        assert_eq!(snapshot.image, "postgres:16");
        assert!(snapshot.created_at > 1_700_000_000);
        assert_eq!(snapshot.ports.len(), 2);
        assert_eq!(snapshot.ports[0].private_port, 5432);
        assert_eq!(snapshot.ports[0].public_port, Some(15432));
        assert_eq!(snapshot.ports[1].public_port, None);
    }

    #[test]
    fn port_key_parsing() {
        assert_eq!(parse_port_key("80/tcp"), Some((80, "tcp".to_string())));
        assert_eq!(parse_port_key("garbage"), None);
    }
}
