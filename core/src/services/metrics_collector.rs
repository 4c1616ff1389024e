use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::events::{EventBus, MonitorEvent};
use crate::gateway::{EngineGateway, GatewayProvider};
use crate::registry::HostRegistry;
use crate::retry::{with_retry, RetryPolicy};
use crate::services::health_monitor::HealthStates;
use crate::types::{
    now_millis, AllStats, ContainerSnapshot, ContainerState, ContainerStats, DiskUsage, Host,
    HostMetrics,
};

/// Fetches container and host metrics per host and fans out across the
/// fleet.
///
/// Every fan-out settles all branches: successes are collected, failures are
/// published as `Error` events with host context, and one unreachable host
/// degrades coverage without aborting the call.
pub struct MetricsCollector {
    registry: Arc<HostRegistry>,
    gateways: Arc<dyn GatewayProvider>,
    health: Arc<HealthStates>,
    bus: EventBus,
    retry: RetryPolicy,
}

impl MetricsCollector {
    pub fn new(
        registry: Arc<HostRegistry>,
        gateways: Arc<dyn GatewayProvider>,
        health: Arc<HealthStates>,
        bus: EventBus,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            gateways,
            health,
            bus,
            retry,
        }
    }

    /// Hosts worth polling: everything registered except hosts the health
    /// monitor currently marks unhealthy. Hosts never checked count as
    /// reachable. A skipped host is still reported as an `Error` event, so
    /// consumers see degraded coverage instead of silence.
    fn fan_out_hosts(&self) -> Vec<Host> {
        let mut reachable = Vec::new();
        for host in self.registry.list_hosts() {
            if self.health.is_unhealthy(host.id) {
                debug!(host_id = host.id, "skipping unhealthy host in fan-out");
                self.bus.emit(&MonitorEvent::Error {
                    message: format!("host {} skipped: marked unhealthy", host.id),
                    host_id: Some(host.id),
                });
            } else {
                reachable.push(host);
            }
        }
        reachable
    }

    fn gateway(&self, host_id: i64) -> Result<Arc<dyn EngineGateway>> {
        let host = self.registry.get_host(host_id)?;
        self.gateways.gateway_for(&host)
    }

    fn report_host_failure(&self, host_id: i64, err: &crate::error::MonitorError) {
        warn!(host_id, "fan-out branch failed: {}", err);
        self.bus.emit(&MonitorEvent::Error {
            message: format!("host {host_id}: {err}"),
            host_id: Some(host_id),
        });
    }

    // ------------------------------------------------------------------
    // Containers
    // ------------------------------------------------------------------

    pub async fn list_containers(&self, host_id: i64) -> Result<Vec<ContainerSnapshot>> {
        let gateway = self.gateway(host_id)?;
        with_retry(&self.retry, || {
            let gateway = gateway.clone();
            async move { gateway.list_containers().await }
        })
        .await
    }

    /// Containers across every reachable host. Partial results on failure;
    /// failed hosts are reported out-of-band.
    pub async fn list_all_containers(&self) -> Vec<ContainerSnapshot> {
        let branches = self.fan_out_hosts().into_iter().map(|host| async move {
            (host.id, self.list_containers(host.id).await)
        });

        let mut all = Vec::new();
        for (host_id, result) in join_all(branches).await {
            match result {
                Ok(mut containers) => all.append(&mut containers),
                Err(err) => self.report_host_failure(host_id, &err),
            }
        }
        all
    }

    pub async fn inspect_container(
        &self,
        host_id: i64,
        container_id: &str,
    ) -> Result<ContainerSnapshot> {
        let gateway = self.gateway(host_id)?;
        let container_id = container_id.to_string();
        with_retry(&self.retry, || {
            let gateway = gateway.clone();
            let container_id = container_id.clone();
            async move { gateway.inspect_container(&container_id).await }
        })
        .await
    }

    // ------------------------------------------------------------------
    // Container stats
    // ------------------------------------------------------------------

    /// Stats for every running container on one host. Containers that vanish
    /// between the list and the stats call are skipped; that churn is normal.
    pub async fn container_stats(&self, host_id: i64) -> Result<Vec<ContainerStats>> {
        let gateway = self.gateway(host_id)?;
        let containers = self.list_containers(host_id).await?;

        let samples = containers
            .into_iter()
            .filter(|c| c.state == ContainerState::Running)
            .map(|snapshot| {
                let gateway = gateway.clone();
                async move {
                    let sample = gateway.container_stats(&snapshot.id).await;
                    (snapshot, sample)
                }
            });

        let mut stats = Vec::new();
        for (snapshot, sample) in join_all(samples).await {
            match sample {
                Ok(sample) => stats.push(ContainerStats {
                    container_id: snapshot.id,
                    host_id,
                    name: snapshot.name,
                    image: snapshot.image,
                    state: snapshot.state,
                    cpu_usage_percent: sample.cpu_usage_percent,
                    memory_usage_bytes: sample.memory_usage_bytes,
                    memory_limit_bytes: sample.memory_limit_bytes,
                    network_rx_bytes: sample.network_rx_bytes,
                    network_tx_bytes: sample.network_tx_bytes,
                }),
                Err(err) => {
                    debug!(host_id, container_id = %snapshot.id, "stats fetch skipped: {}", err);
                }
            }
        }
        Ok(stats)
    }

    /// Stats for one specific container.
    pub async fn container_stats_one(
        &self,
        host_id: i64,
        container_id: &str,
    ) -> Result<ContainerStats> {
        let gateway = self.gateway(host_id)?;
        let snapshot = self.inspect_container(host_id, container_id).await?;
        let sample = {
            let container_id = container_id.to_string();
            with_retry(&self.retry, || {
                let gateway = gateway.clone();
                let container_id = container_id.clone();
                async move { gateway.container_stats(&container_id).await }
            })
            .await?
        };

        Ok(ContainerStats {
            container_id: snapshot.id,
            host_id,
            name: snapshot.name,
            image: snapshot.image,
            state: snapshot.state,
            cpu_usage_percent: sample.cpu_usage_percent,
            memory_usage_bytes: sample.memory_usage_bytes,
            memory_limit_bytes: sample.memory_limit_bytes,
            network_rx_bytes: sample.network_rx_bytes,
            network_tx_bytes: sample.network_tx_bytes,
        })
    }

    pub async fn all_container_stats(&self) -> Vec<ContainerStats> {
        let branches = self.fan_out_hosts().into_iter().map(|host| async move {
            (host.id, self.container_stats(host.id).await)
        });

        let mut all = Vec::new();
        for (host_id, result) in join_all(branches).await {
            match result {
                Ok(mut stats) => all.append(&mut stats),
                Err(err) => self.report_host_failure(host_id, &err),
            }
        }
        all
    }

    // ------------------------------------------------------------------
    // Host metrics
    // ------------------------------------------------------------------

    pub async fn host_metrics(&self, host_id: i64) -> Result<HostMetrics> {
        let host = self.registry.get_host(host_id)?;
        let gateway = self.gateways.gateway_for(&host)?;
        let info = with_retry(&self.retry, || {
            let gateway = gateway.clone();
            async move { gateway.system_info().await }
        })
        .await?;

        let host_name = if host.name.is_empty() {
            info.host_name
        } else {
            host.name
        };

        Ok(HostMetrics {
            host_id,
            host_name,
            engine_version: info.engine_version,
            os: info.os,
            architecture: info.architecture,
            total_memory_bytes: info.total_memory_bytes,
            total_cpus: info.total_cpus,
            container_count: info.container_count,
            running_container_count: info.running_container_count,
            image_count: info.image_count,
        })
    }

    pub async fn all_host_metrics(&self) -> Vec<HostMetrics> {
        let branches = self.fan_out_hosts().into_iter().map(|host| async move {
            (host.id, self.host_metrics(host.id).await)
        });

        let mut all = Vec::new();
        for (host_id, result) in join_all(branches).await {
            match result {
                Ok(metrics) => all.push(metrics),
                Err(err) => self.report_host_failure(host_id, &err),
            }
        }
        all
    }

    pub async fn disk_usage(&self, host_id: i64) -> Result<DiskUsage> {
        let gateway = self.gateway(host_id)?;
        with_retry(&self.retry, || {
            let gateway = gateway.clone();
            async move { gateway.disk_usage().await }
        })
        .await
    }

    // ------------------------------------------------------------------
    // Combined
    // ------------------------------------------------------------------

    /// One combined collection cycle. Container stats and host metrics are
    /// gathered concurrently rather than back-to-back; the shared timestamp
    /// is taken once both halves have settled.
    pub async fn all_stats(&self) -> AllStats {
        let (container_stats, host_metrics) =
            tokio::join!(self.all_container_stats(), self.all_host_metrics());

        AllStats {
            container_stats,
            host_metrics,
            collected_at: now_millis(),
        }
    }
}
