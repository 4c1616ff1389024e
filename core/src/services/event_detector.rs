use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::error::Result;
use crate::events::{EventBus, MonitorEvent};
use crate::registry::HostRegistry;
use crate::services::metrics_collector::MetricsCollector;
use crate::types::{ContainerSnapshot, ContainerState};

/// Detects container lifecycle transitions by diffing successive list
/// snapshots, since the engine offers no push API across hosts.
///
/// The full snapshot of each container is retained, not just its id, so a
/// `ContainerStopped` event can carry the last known state of a container
/// that is no longer fetchable.
pub struct EventDetector {
    registry: Arc<HostRegistry>,
    collector: Arc<MetricsCollector>,
    bus: EventBus,
    last_seen: Mutex<HashMap<i64, HashMap<String, ContainerSnapshot>>>,
    in_flight: Mutex<HashSet<i64>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl EventDetector {
    pub fn new(
        registry: Arc<HostRegistry>,
        collector: Arc<MetricsCollector>,
        bus: EventBus,
    ) -> Self {
        Self {
            registry,
            collector,
            bus,
            last_seen: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            timer: Mutex::new(None),
        }
    }

    /// Poll one host and publish started/stopped events for the delta since
    /// the previous poll.
    ///
    /// The very first poll of a host only seeds the baseline: pre-existing
    /// containers must not fire synthetic "started" events. A poll that
    /// completes after its host was removed discards its result.
    pub async fn poll_host(&self, host_id: i64) -> Result<()> {
        {
            let mut in_flight = self.in_flight.lock().expect("in-flight lock poisoned");
            if !in_flight.insert(host_id) {
                debug!(host_id, "lifecycle poll already in flight, skipping");
                return Ok(());
            }
        }

        let fetched = self.collector.list_containers(host_id).await;
        self.in_flight
            .lock()
            .expect("in-flight lock poisoned")
            .remove(&host_id);
        let containers = fetched?;

        // Diff the running set: a container that merely exits keeps its list
        // entry, so diffing all listed containers would never notice a stop.
        let current: HashMap<String, ContainerSnapshot> = containers
            .into_iter()
            .filter(|c| c.state == ContainerState::Running)
            .map(|c| (c.id.clone(), c))
            .collect();

        // Events are computed under the lock but emitted after releasing it,
        // so a handler may call back into the detector.
        let mut events = Vec::new();
        {
            let mut last_seen = self.last_seen.lock().expect("last-seen lock poisoned");

            if !self.registry.contains(host_id) {
                // Removed while the fetch was in flight; do not resurrect.
                last_seen.remove(&host_id);
                debug!(host_id, "host removed mid-poll, discarding result");
                return Ok(());
            }

            match last_seen.get(&host_id) {
                None => {
                    info!(host_id, containers = current.len(), "seeded container baseline");
                }
                Some(previous) => {
                    for (id, snapshot) in &current {
                        if !previous.contains_key(id) {
                            events.push(MonitorEvent::ContainerStarted {
                                host_id,
                                container: snapshot.clone(),
                            });
                        }
                    }
                    for (id, snapshot) in previous {
                        if !current.contains_key(id) {
                            events.push(MonitorEvent::ContainerStopped {
                                host_id,
                                container: snapshot.clone(),
                            });
                        }
                    }
                }
            }

            last_seen.insert(host_id, current);
        }

        for event in &events {
            self.bus.emit(event);
        }
        Ok(())
    }

    /// Poll every registered host concurrently; a failing host is reported
    /// as an `Error` event and never aborts the sweep.
    pub async fn poll_all(&self) {
        let hosts = self.registry.list_hosts();
        let polls = hosts.iter().map(|host| {
            let host_id = host.id;
            async move { (host_id, self.poll_host(host_id).await) }
        });

        for (host_id, result) in join_all(polls).await {
            if let Err(err) = result {
                debug!(host_id, "lifecycle poll failed: {}", err);
                self.bus.emit(&MonitorEvent::Error {
                    message: format!("lifecycle poll for host {host_id}: {err}"),
                    host_id: Some(host_id),
                });
            }
        }
    }

    /// Start the recurring poll; the immediate first sweep seeds baselines.
    /// No-op if already running.
    pub fn start(self: &Arc<Self>, every: Duration) {
        let mut timer = self.timer.lock().expect("timer lock poisoned");
        if timer.is_some() {
            return;
        }
        let detector = Arc::clone(self);
        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                detector.poll_all().await;
            }
        }));
    }

    /// Stop the recurring poll; idempotent.
    pub fn stop(&self) {
        if let Some(handle) = self.timer.lock().expect("timer lock poisoned").take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer.lock().expect("timer lock poisoned").is_some()
    }

    /// Drop the last-seen set for a removed host so a re-added host starts
    /// from a fresh baseline.
    pub fn forget_host(&self, host_id: i64) {
        self.last_seen
            .lock()
            .expect("last-seen lock poisoned")
            .remove(&host_id);
    }
}
