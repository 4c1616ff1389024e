use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fleetmon_core::{
    ContainerSnapshot, ContainerState, DiskUsage, EngineGateway, EngineInfo, EventKind,
    FleetMonitor, GatewayProvider, Host, MonitorConfig, MonitorError, MonitorEvent, Result,
    StatsSample,
};

/// Scripted engine state for one simulated host. Tests flip reachability,
/// inject latency, and rewrite the container set between polls.
pub struct HostSim {
    containers: Mutex<Vec<ContainerSnapshot>>,
    unreachable: AtomicBool,
    latency: Mutex<Duration>,
    pub ping_count: AtomicU32,
    pub list_count: AtomicU32,
}

impl HostSim {
    fn new() -> Self {
        Self {
            containers: Mutex::new(Vec::new()),
            unreachable: AtomicBool::new(false),
            latency: Mutex::new(Duration::ZERO),
            ping_count: AtomicU32::new(0),
            list_count: AtomicU32::new(0),
        }
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn set_containers(&self, containers: Vec<ContainerSnapshot>) {
        *self.containers.lock().unwrap() = containers;
    }

    pub fn add_container(&self, container: ContainerSnapshot) {
        self.containers.lock().unwrap().push(container);
    }

    pub fn remove_container(&self, container_id: &str) {
        self.containers
            .lock()
            .unwrap()
            .retain(|c| c.id != container_id);
    }

    pub fn pings(&self) -> u32 {
        self.ping_count.load(Ordering::SeqCst)
    }
}

/// Gateway provider over a set of simulated hosts; sims are created on
/// demand so tests can script a host before or after registering it.
pub struct MockFleet {
    sims: Mutex<HashMap<i64, Arc<HostSim>>>,
}

impl MockFleet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sims: Mutex::new(HashMap::new()),
        })
    }

    pub fn sim(&self, host_id: i64) -> Arc<HostSim> {
        self.sims
            .lock()
            .unwrap()
            .entry(host_id)
            .or_insert_with(|| Arc::new(HostSim::new()))
            .clone()
    }
}

impl GatewayProvider for MockFleet {
    fn gateway_for(&self, host: &Host) -> Result<Arc<dyn EngineGateway>> {
        Ok(Arc::new(MockEngine {
            host_id: host.id,
            sim: self.sim(host.id),
        }))
    }
}

struct MockEngine {
    host_id: i64,
    sim: Arc<HostSim>,
}

impl MockEngine {
    /// Apply scripted latency, then scripted reachability.
    async fn gate(&self) -> Result<()> {
        let latency = *self.sim.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.sim.unreachable.load(Ordering::SeqCst) {
            return Err(MonitorError::transport("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl EngineGateway for MockEngine {
    async fn ping(&self) -> Result<()> {
        self.sim.ping_count.fetch_add(1, Ordering::SeqCst);
        self.gate().await
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSnapshot>> {
        self.sim.list_count.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        Ok(self.sim.containers.lock().unwrap().clone())
    }

    async fn inspect_container(&self, container_id: &str) -> Result<ContainerSnapshot> {
        self.gate().await?;
        self.sim
            .containers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == container_id)
            .cloned()
            .ok_or_else(|| MonitorError::ContainerNotFound(container_id.to_string()))
    }

    async fn container_stats(&self, container_id: &str) -> Result<StatsSample> {
        self.gate().await?;
        let exists = self
            .sim
            .containers
            .lock()
            .unwrap()
            .iter()
            .any(|c| c.id == container_id);
        if !exists {
            return Err(MonitorError::ContainerNotFound(container_id.to_string()));
        }
        Ok(StatsSample {
            cpu_usage_percent: 12.5,
            memory_usage_bytes: 64 << 20,
            memory_limit_bytes: 512 << 20,
            network_rx_bytes: 4096,
            network_tx_bytes: 1024,
        })
    }

    async fn system_info(&self) -> Result<EngineInfo> {
        self.gate().await?;
        let containers = self.sim.containers.lock().unwrap();
        let running = containers
            .iter()
            .filter(|c| c.state == ContainerState::Running)
            .count() as u32;
        Ok(EngineInfo {
            host_name: format!("sim-{}", self.host_id),
            engine_version: "27.1.0".to_string(),
            os: "Alpine Linux v3.20".to_string(),
            architecture: "x86_64".to_string(),
            total_memory_bytes: 8 << 30,
            total_cpus: 4,
            container_count: containers.len() as u32,
            running_container_count: running,
            image_count: 9,
        })
    }

    async fn disk_usage(&self) -> Result<DiskUsage> {
        self.gate().await?;
        Ok(DiskUsage {
            host_id: self.host_id,
            layers_size_bytes: 2 << 30,
            image_count: 9,
            container_count: self.sim.containers.lock().unwrap().len() as u32,
            volume_count: 3,
        })
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn host(id: i64, name: &str) -> Host {
    Host {
        id,
        name: name.to_string(),
        address: format!("10.0.0.{id}"),
        port: None,
        secure: false,
    }
}

pub fn container(id: &str, host_id: i64, state: ContainerState) -> ContainerSnapshot {
    ContainerSnapshot {
        id: id.to_string(),
        host_id,
        name: format!("svc-{id}"),
        image: "nginx:latest".to_string(),
        state,
        ports: Vec::new(),
        labels: HashMap::new(),
        created_at: 1_700_000_000,
    }
}

pub fn monitor_with(fleet: &Arc<MockFleet>, config: MonitorConfig) -> Arc<FleetMonitor> {
    Arc::new(FleetMonitor::new(config, fleet.clone(), None))
}

// ============================================================================
// Event recording
// ============================================================================

/// Captures every bus event so tests can assert exact counts and payloads.
pub struct EventRecorder {
    events: Arc<Mutex<Vec<MonitorEvent>>>,
}

impl EventRecorder {
    pub fn attach(monitor: &FleetMonitor) -> Self {
        Self::attach_bus(monitor.events())
    }

    pub fn attach_bus(bus: &fleetmon_core::EventBus) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        bus.on_any(move |event| {
            sink.lock().unwrap().push(event.clone());
        });
        Self { events }
    }

    pub fn events(&self) -> Vec<MonitorEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn of_kind(&self, kind: EventKind) -> Vec<MonitorEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind() == kind)
            .collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.of_kind(kind).len()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    /// Error events naming the given host.
    pub fn errors_for_host(&self, host_id: i64) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, MonitorEvent::Error { host_id: Some(id), .. } if *id == host_id))
            .count()
    }
}

// ============================================================================
// Stream helpers
// ============================================================================

pub fn subscribe_msg(id: &str, channel: &str, data: serde_json::Value) -> String {
    serde_json::json!({
        "id": id,
        "type": "subscribe",
        "channel": channel,
        "data": data,
    })
    .to_string()
}

pub fn unsubscribe_msg(id: &str) -> String {
    serde_json::json!({
        "id": id,
        "type": "unsubscribe",
    })
    .to_string()
}

/// Drain everything currently buffered on a stream connection.
pub fn drain(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<fleetmon_core::ServerMessage>,
) -> Vec<fleetmon_core::ServerMessage> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame);
    }
    frames
}
