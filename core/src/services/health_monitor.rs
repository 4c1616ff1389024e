use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::error::Result;
use crate::events::{EventBus, MonitorEvent};
use crate::gateway::GatewayProvider;
use crate::registry::HostRegistry;
use crate::retry::{with_retry, RetryPolicy};
use crate::types::now_millis;

/// Latest health verdict for one host. Written only by the health monitor;
/// read by the collector and stream layers to skip unreachable hosts.
#[derive(Debug, Clone)]
pub struct HealthState {
    pub host_id: i64,
    pub healthy: bool,
    /// Unix milliseconds of the last completed check.
    pub last_checked_at: i64,
    pub consecutive_failures: u32,
}

/// Shared health map. One entry per host that has completed at least one
/// check; hosts never checked are treated as reachable until proven
/// otherwise.
#[derive(Default)]
pub struct HealthStates {
    inner: RwLock<HashMap<i64, HealthState>>,
}

impl HealthStates {
    pub fn get(&self, host_id: i64) -> Option<HealthState> {
        self.inner
            .read()
            .expect("health state lock poisoned")
            .get(&host_id)
            .cloned()
    }

    pub fn snapshot(&self) -> HashMap<i64, HealthState> {
        self.inner.read().expect("health state lock poisoned").clone()
    }

    /// True only for hosts with a recorded failing check.
    pub fn is_unhealthy(&self, host_id: i64) -> bool {
        self.get(host_id).is_some_and(|s| !s.healthy)
    }

    fn record(&self, state: HealthState) {
        self.inner
            .write()
            .expect("health state lock poisoned")
            .insert(state.host_id, state);
    }

    fn forget(&self, host_id: i64) {
        self.inner
            .write()
            .expect("health state lock poisoned")
            .remove(&host_id);
    }
}

/// Periodically probes every registered host and publishes `HealthChanged`
/// on transitions only, so a host that stays down produces one event, not an
/// event per check.
pub struct HealthMonitor {
    registry: Arc<HostRegistry>,
    gateways: Arc<dyn GatewayProvider>,
    bus: EventBus,
    retry: RetryPolicy,
    states: Arc<HealthStates>,
    /// Hosts with a check currently in flight; a second check for the same
    /// host is skipped, not queued.
    in_flight: Mutex<HashSet<i64>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<HostRegistry>,
        gateways: Arc<dyn GatewayProvider>,
        bus: EventBus,
        retry: RetryPolicy,
        states: Arc<HealthStates>,
    ) -> Self {
        Self {
            registry,
            gateways,
            bus,
            retry,
            states,
            in_flight: Mutex::new(HashSet::new()),
            timer: Mutex::new(None),
        }
    }

    pub fn states(&self) -> Arc<HealthStates> {
        self.states.clone()
    }

    /// Probe one host, updating its health state and publishing
    /// `HealthChanged` if the verdict flipped. Retries are internal: one
    /// call produces at most one transition regardless of attempt count.
    ///
    /// Returns the resulting healthy flag; errors only for unknown hosts.
    pub async fn check_host(&self, host_id: i64) -> Result<bool> {
        let host = self.registry.get_host(host_id)?;

        {
            let mut in_flight = self.in_flight.lock().expect("in-flight lock poisoned");
            if !in_flight.insert(host_id) {
                debug!(host_id, "health check already in flight, skipping");
                return Ok(self.states.get(host_id).map(|s| s.healthy).unwrap_or(false));
            }
        }

        let probe = async {
            let gateway = self.gateways.gateway_for(&host)?;
            with_retry(&self.retry, || {
                let gateway = gateway.clone();
                async move { gateway.ping().await }
            })
            .await
        };
        let healthy = match probe.await {
            Ok(()) => true,
            Err(err) => {
                debug!(host_id, "health probe failed: {}", err);
                false
            }
        };

        self.in_flight
            .lock()
            .expect("in-flight lock poisoned")
            .remove(&host_id);

        // The host may have been removed while the probe was in flight; in
        // that case the result is discarded instead of resurrecting state.
        if !self.registry.contains(host_id) {
            debug!(host_id, "host removed mid-check, discarding result");
            return Ok(healthy);
        }

        let previous = self.states.get(host_id);
        let flipped = previous.as_ref().map(|p| p.healthy != healthy).unwrap_or(true);
        let consecutive_failures = if healthy {
            0
        } else {
            previous.map(|p| p.consecutive_failures).unwrap_or(0) + 1
        };

        self.states.record(HealthState {
            host_id,
            healthy,
            last_checked_at: now_millis(),
            consecutive_failures,
        });

        if flipped {
            if !healthy {
                warn!(host_id, "host became unhealthy");
            }
            self.bus.emit(&MonitorEvent::HealthChanged { host_id, healthy });
        }

        Ok(healthy)
    }

    /// Check every registered host concurrently. Each check is isolated: a
    /// failing host contributes `false`, it never aborts the sweep. Returns
    /// one entry per host that was registered when the sweep started.
    pub async fn check_all(&self) -> HashMap<i64, bool> {
        let hosts = self.registry.list_hosts();
        let checks = hosts.iter().map(|host| {
            let host_id = host.id;
            async move { (host_id, self.check_host(host_id).await) }
        });

        join_all(checks)
            .await
            .into_iter()
            .filter_map(|(host_id, result)| match result {
                Ok(healthy) => Some((host_id, healthy)),
                // Removed while the sweep ran; no longer a configured host.
                Err(_) => None,
            })
            .collect()
    }

    /// Start the recurring sweep. The first sweep runs immediately so health
    /// state is seeded before anything consults it. No-op if already running.
    pub fn start(self: &Arc<Self>, every: Duration) {
        let mut timer = self.timer.lock().expect("timer lock poisoned");
        if timer.is_some() {
            return;
        }
        let monitor = Arc::clone(self);
        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                monitor.check_all().await;
            }
        }));
    }

    /// Stop the recurring sweep. Effective immediately for future ticks;
    /// idempotent and safe on a never-started monitor.
    pub fn stop(&self) {
        if let Some(handle) = self.timer.lock().expect("timer lock poisoned").take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer.lock().expect("timer lock poisoned").is_some()
    }

    /// Drop derived state for a removed host.
    pub fn forget_host(&self, host_id: i64) {
        self.states.forget(host_id);
    }
}
