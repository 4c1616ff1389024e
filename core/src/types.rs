use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::OffsetDateTime;

/// Current wall-clock time as unix milliseconds, the timestamp unit used on
/// the stream wire protocol and in `AllStats`.
pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

// ============================================================================
// Host Types
// ============================================================================

/// One remote container-engine endpoint being monitored. Unique by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Registry key. `0` means "not yet persisted"; the store assigns a real
    /// id on save.
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub address: String,
    /// Engine API port; `None` picks the default for the scheme.
    #[serde(default)]
    pub port: Option<u16>,
    /// Reach the engine over https instead of plain http.
    #[serde(default)]
    pub secure: bool,
}

impl Host {
    /// Effective engine port, defaulting per scheme.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(if self.secure { 2376 } else { 2375 })
    }

    pub fn scheme(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }
}

// ============================================================================
// Container Types
// ============================================================================

/// Container state as reported by the engine; serializes to lowercase JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Running,
    Exited,
    Paused,
    Restarting,
    Created,
    Dead,
}

impl ContainerState {
    /// Strict parse of a state name; `None` for anything unrecognized.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "running" => Some(Self::Running),
            "exited" => Some(Self::Exited),
            "paused" => Some(Self::Paused),
            "restarting" => Some(Self::Restarting),
            "created" => Some(Self::Created),
            "dead" => Some(Self::Dead),
            _ => None,
        }
    }

    /// Parse an engine state string. Strings the engine may grow later fall
    /// back to `Dead`, the terminal bucket, rather than failing the list call.
    pub fn from_engine(s: &str) -> Self {
        Self::parse(s).unwrap_or(Self::Dead)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Exited => "exited",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::Created => "created",
            Self::Dead => "dead",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub private_port: u16,
    pub public_port: Option<u16>,
    pub protocol: String,
}

/// Point-in-time view of one container; rebuilt on every poll, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    pub id: String,
    pub host_id: i64,
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    pub ports: Vec<PortMapping>,
    pub labels: HashMap<String, String>,
    /// Unix seconds.
    pub created_at: i64,
}

/// Resource usage of one running container at one poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStats {
    pub container_id: String,
    pub host_id: i64,
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    pub cpu_usage_percent: f64,
    pub memory_usage_bytes: u64,
    pub memory_limit_bytes: u64,
    pub network_rx_bytes: u64,
    pub network_tx_bytes: u64,
}

// ============================================================================
// Host Metrics
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostMetrics {
    pub host_id: i64,
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

/// Engine disk accounting for one host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskUsage {
    pub host_id: i64,
    pub layers_size_bytes: u64,
    pub image_count: u32,
    pub container_count: u32,
    pub volume_count: u32,
}

/// One combined collection cycle over the whole fleet. Both halves are
/// gathered concurrently and share a single `collected_at` stamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllStats {
    pub container_stats: Vec<ContainerStats>,
    pub host_metrics: Vec<HostMetrics>,
    /// Unix milliseconds, taken after both halves completed.
    pub collected_at: i64,
}
