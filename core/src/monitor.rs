use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::events::{EventBus, EventKind, HandlerId, MonitorEvent};
use crate::gateway::GatewayProvider;
use crate::registry::{HostRegistry, HostStore};
use crate::services::{EventDetector, HealthMonitor, HealthStates, MetricsCollector};
use crate::stream::StreamManager;
use crate::types::{
    AllStats, ContainerSnapshot, ContainerStats, DiskUsage, Host, HostMetrics,
};

/// Facade over the whole monitoring subsystem: one registry, one event bus,
/// and the health/metrics/lifecycle services wired together with a shared
/// stream manager.
///
/// All collaborators are injected at construction so isolated instances can
/// be built in tests; nothing here is a global.
pub struct FleetMonitor {
    config: MonitorConfig,
    registry: Arc<HostRegistry>,
    bus: EventBus,
    gateways: Arc<dyn GatewayProvider>,
    health: Arc<HealthMonitor>,
    collector: Arc<MetricsCollector>,
    detector: Arc<EventDetector>,
    streams: Arc<StreamManager>,
    monitoring: AtomicBool,
}

impl FleetMonitor {
    pub fn new(
        config: MonitorConfig,
        gateways: Arc<dyn GatewayProvider>,
        store: Option<Arc<dyn HostStore>>,
    ) -> Self {
        let registry = Arc::new(HostRegistry::new(store));
        let bus = EventBus::new();
        let states = Arc::new(HealthStates::default());

        let health = Arc::new(HealthMonitor::new(
            registry.clone(),
            gateways.clone(),
            bus.clone(),
            config.retry.clone(),
            states.clone(),
        ));
        let collector = Arc::new(MetricsCollector::new(
            registry.clone(),
            gateways.clone(),
            states,
            bus.clone(),
            config.retry.clone(),
        ));
        let detector = Arc::new(EventDetector::new(
            registry.clone(),
            collector.clone(),
            bus.clone(),
        ));
        let streams = StreamManager::new(collector.clone(), registry.clone(), &bus);

        Self {
            config,
            registry,
            bus,
            gateways,
            health,
            collector,
            detector,
            streams,
            monitoring: AtomicBool::new(false),
        }
    }

    // ------------------------------------------------------------------
    // Host management
    // ------------------------------------------------------------------

    /// Refresh the host cache from the configured store.
    pub async fn load_hosts(&self) -> Result<usize> {
        self.registry.load().await
    }

    /// Upsert a host. A changed record invalidates any cached gateway so the
    /// next call reaches the new address.
    pub async fn add_host(&self, host: Host) -> Result<Host> {
        let stored = self.registry.add_host(host).await?;
        self.gateways.invalidate(stored.id);
        Ok(stored)
    }

    /// Remove a host and tear down every piece of derived state. The
    /// registry entry goes first, so a poll still in flight for this host
    /// sees the removal and discards its result instead of resurrecting
    /// state.
    pub async fn remove_host(&self, host_id: i64) -> Result<Host> {
        let removed = self.registry.remove_host(host_id).await?;
        self.gateways.invalidate(host_id);
        self.health.forget_host(host_id);
        self.detector.forget_host(host_id);
        Ok(removed)
    }

    pub fn get_host(&self, host_id: i64) -> Result<Host> {
        self.registry.get_host(host_id)
    }

    pub fn list_hosts(&self) -> Vec<Host> {
        self.registry.list_hosts()
    }

    // ------------------------------------------------------------------
    // Health
    // ------------------------------------------------------------------

    pub async fn check_host_health(&self, host_id: i64) -> Result<bool> {
        self.health.check_host(host_id).await
    }

    pub async fn check_all_hosts_health(&self) -> HashMap<i64, bool> {
        self.health.check_all().await
    }

    // ------------------------------------------------------------------
    // Containers & metrics
    // ------------------------------------------------------------------

    pub async fn get_all_containers(&self) -> Vec<ContainerSnapshot> {
        self.collector.list_all_containers().await
    }

    pub async fn get_containers_for_host(&self, host_id: i64) -> Result<Vec<ContainerSnapshot>> {
        self.collector.list_containers(host_id).await
    }

    pub async fn inspect_container(
        &self,
        host_id: i64,
        container_id: &str,
    ) -> Result<ContainerSnapshot> {
        self.collector.inspect_container(host_id, container_id).await
    }

    pub async fn get_all_container_stats(&self) -> Vec<ContainerStats> {
        self.collector.all_container_stats().await
    }

    pub async fn get_container_stats_for_host(&self, host_id: i64) -> Result<Vec<ContainerStats>> {
        self.collector.container_stats(host_id).await
    }

    pub async fn get_all_host_metrics(&self) -> Vec<HostMetrics> {
        self.collector.all_host_metrics().await
    }

    pub async fn get_host_metrics(&self, host_id: i64) -> Result<HostMetrics> {
        self.collector.host_metrics(host_id).await
    }

    pub async fn get_disk_usage(&self, host_id: i64) -> Result<DiskUsage> {
        self.collector.disk_usage(host_id).await
    }

    pub async fn get_all_stats(&self) -> AllStats {
        self.collector.all_stats().await
    }

    // ------------------------------------------------------------------
    // Monitoring lifecycle
    // ------------------------------------------------------------------

    /// Start the enabled background monitors on their configured, independent
    /// schedules. Idempotent.
    pub fn start_monitoring(&self) {
        if self.monitoring.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.config.health_checks_enabled {
            self.health.start(self.config.health_interval);
        }
        if self.config.event_detection_enabled {
            self.detector.start(self.config.event_interval);
        }
        info!(
            health_interval_ms = self.config.health_interval.as_millis() as u64,
            event_interval_ms = self.config.event_interval.as_millis() as u64,
            "monitoring started"
        );
    }

    /// Stop all background monitors. Effective immediately for future ticks;
    /// idempotent and safe if monitoring never started.
    pub fn stop_monitoring(&self) {
        self.health.stop();
        self.detector.stop();
        if self.monitoring.swap(false, Ordering::SeqCst) {
            info!("monitoring stopped");
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Events & streaming
    // ------------------------------------------------------------------

    pub fn on(
        &self,
        kind: EventKind,
        handler: impl Fn(&MonitorEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.bus.on(kind, handler)
    }

    pub fn on_any(&self, handler: impl Fn(&MonitorEvent) + Send + Sync + 'static) -> HandlerId {
        self.bus.on_any(handler)
    }

    pub fn off(&self, handle: HandlerId) {
        self.bus.off(handle)
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn streams(&self) -> &Arc<StreamManager> {
        &self.streams
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }
}

impl Drop for FleetMonitor {
    fn drop(&mut self) {
        self.health.stop();
        self.detector.stop();
    }
}
