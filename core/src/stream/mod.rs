pub mod messages;

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::error::{MonitorError, Result};
use crate::events::EventBus;
use crate::registry::HostRegistry;
use crate::services::metrics_collector::MetricsCollector;
use crate::types::ContainerState;

pub use messages::{
    channel_catalog, Channel, ChannelInfo, ClientMessage, ServerMessage, ServerMessageType,
    SubscribeOptions,
};

/// Floor for subscription intervals; anything lower would busy-poll the
/// engine hosts.
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Validated backing call for one subscription.
#[derive(Debug, Clone)]
enum ChannelSpec {
    ContainerList { state: Option<ContainerState> },
    HostMetrics { host_id: Option<i64> },
    ContainerStats { host_id: i64, container_id: String },
    AllStats,
}

struct Subscription {
    channel: Channel,
    /// `None` for the push-only events channel.
    task: Option<JoinHandle<()>>,
}

struct Connection {
    sender: UnboundedSender<ServerMessage>,
    subscriptions: HashMap<String, Subscription>,
}

impl Connection {
    fn drop_subscription(&mut self, id: &str) -> bool {
        match self.subscriptions.remove(id) {
            Some(sub) => {
                if let Some(task) = sub.task {
                    task.abort();
                }
                true
            }
            None => false,
        }
    }

    fn drop_all(&mut self) {
        for (_, sub) in self.subscriptions.drain() {
            if let Some(task) = sub.task {
                task.abort();
            }
        }
    }
}

/// Turns periodic pulls into push-style messages for any number of long-lived
/// consumers.
///
/// Each subscription owns one timer task; cancelling it (unsubscribe or
/// connection close) aborts the task immediately, so a fetch still in flight
/// is dropped at its next suspension point and never delivers. A tick whose
/// predecessor is still running is skipped, not queued.
pub struct StreamManager {
    collector: Arc<MetricsCollector>,
    registry: Arc<HostRegistry>,
    connections: Arc<Mutex<HashMap<String, Connection>>>,
}

impl StreamManager {
    /// Build the manager and hook the events channel into the bus. The bus
    /// handler lives as long as the bus does.
    pub fn new(
        collector: Arc<MetricsCollector>,
        registry: Arc<HostRegistry>,
        bus: &EventBus,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            collector,
            registry,
            connections: Arc::new(Mutex::new(HashMap::new())),
        });

        let connections = manager.connections.clone();
        bus.on_any(move |event| {
            let payload = match serde_json::to_value(event) {
                Ok(value) => value,
                Err(err) => {
                    warn!("failed to serialize event for stream: {}", err);
                    return;
                }
            };
            let connections = connections.lock().expect("connections lock poisoned");
            for conn in connections.values() {
                for sub in conn.subscriptions.values() {
                    if sub.channel == Channel::Events {
                        let _ = conn
                            .sender
                            .send(ServerMessage::data(Channel::Events.as_str(), payload.clone()));
                    }
                }
            }
        });

        manager
    }

    /// Channel catalog for discovery.
    pub fn available_channels(&self) -> Vec<ChannelInfo> {
        channel_catalog()
    }

    /// Open a logical connection and hand back its outbound frame stream.
    /// An existing connection with the same id is closed first.
    pub fn create_connection(&self, connection_id: &str) -> UnboundedReceiver<ServerMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut connections = self.connections.lock().expect("connections lock poisoned");
        if let Some(mut old) = connections.remove(connection_id) {
            old.drop_all();
        }
        connections.insert(
            connection_id.to_string(),
            Connection {
                sender,
                subscriptions: HashMap::new(),
            },
        );
        debug!(connection_id, "stream connection opened");
        receiver
    }

    /// Close a connection, cancelling every subscription it owns. Safe to
    /// call on an unknown or already-closed connection.
    pub fn close_connection(&self, connection_id: &str) {
        let mut connections = self.connections.lock().expect("connections lock poisoned");
        if let Some(mut conn) = connections.remove(connection_id) {
            conn.drop_all();
            debug!(connection_id, "stream connection closed");
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().expect("connections lock poisoned").len()
    }

    /// Handle one inbound control frame. Malformed frames, unknown channels,
    /// and bad filters are answered with a synchronous error frame; they
    /// never create a subscription.
    pub fn handle_message(&self, connection_id: &str, raw: &str) {
        match serde_json::from_str::<ClientMessage>(raw) {
            Ok(ClientMessage::Subscribe { id, channel, data }) => {
                self.subscribe(connection_id, id, &channel, data)
            }
            Ok(ClientMessage::Unsubscribe { id }) => self.unsubscribe(connection_id, &id),
            Err(err) => {
                self.send_to(connection_id, ServerMessage::error(None, format!("malformed message: {err}")));
            }
        }
    }

    /// Cancel one subscription. Calling twice, or for an id that never
    /// existed, is a no-op.
    pub fn unsubscribe(&self, connection_id: &str, subscription_id: &str) {
        let mut connections = self.connections.lock().expect("connections lock poisoned");
        if let Some(conn) = connections.get_mut(connection_id) {
            if conn.drop_subscription(subscription_id) {
                debug!(connection_id, subscription_id, "unsubscribed");
            }
        }
    }

    fn subscribe(
        &self,
        connection_id: &str,
        subscription_id: String,
        channel_name: &str,
        options: SubscribeOptions,
    ) {
        let Some(channel) = Channel::parse(channel_name) else {
            self.send_to(
                connection_id,
                ServerMessage::error(None, format!("unknown channel: {channel_name}")),
            );
            return;
        };

        // The events channel is push-only: no timer, no options.
        if channel == Channel::Events {
            self.install(connection_id, subscription_id, channel, None);
            return;
        }

        let spec = match self.validate(channel, &options) {
            Ok(spec) => spec,
            Err(err) => {
                self.send_to(connection_id, ServerMessage::error(Some(channel_name), err.to_string()));
                return;
            }
        };

        let interval = Duration::from_millis(options.interval.unwrap_or_default());
        let sender = {
            let connections = self.connections.lock().expect("connections lock poisoned");
            match connections.get(connection_id) {
                Some(conn) => conn.sender.clone(),
                None => {
                    warn!(connection_id, "subscribe for unknown connection");
                    return;
                }
            }
        };

        let task = self.spawn_poll_task(channel, spec, interval, sender);
        self.install(connection_id, subscription_id, channel, Some(task));
    }

    /// Validate options against the channel's schema and resolve the backing
    /// call. `Config` for schema violations, `HostNotFound` for filters that
    /// reference a host that is not registered.
    fn validate(&self, channel: Channel, options: &SubscribeOptions) -> Result<ChannelSpec> {
        let interval = options
            .interval
            .ok_or_else(|| MonitorError::Config(format!("channel {} requires an interval", channel.as_str())))?;
        if Duration::from_millis(interval) < MIN_INTERVAL {
            return Err(MonitorError::Config(format!(
                "interval must be at least {}ms",
                MIN_INTERVAL.as_millis()
            )));
        }

        match channel {
            Channel::ContainerList => {
                let state = match options.filters.as_ref().and_then(|f| f.get("state")) {
                    Some(raw) => Some(ContainerState::parse(raw).ok_or_else(|| {
                        MonitorError::Config(format!("unknown container state filter: {raw}"))
                    })?),
                    None => None,
                };
                if let Some(filters) = &options.filters {
                    if let Some(key) = filters.keys().find(|k| k.as_str() != "state") {
                        return Err(MonitorError::Config(format!("unknown filter: {key}")));
                    }
                }
                Ok(ChannelSpec::ContainerList { state })
            }
            Channel::HostMetrics => {
                if let Some(host_id) = options.host_id {
                    if !self.registry.contains(host_id) {
                        return Err(MonitorError::HostNotFound(host_id));
                    }
                }
                Ok(ChannelSpec::HostMetrics {
                    host_id: options.host_id,
                })
            }
            Channel::ContainerStats => {
                let host_id = options
                    .host_id
                    .ok_or_else(|| MonitorError::Config("container_stats requires hostId".into()))?;
                let container_id = options
                    .container_id
                    .clone()
                    .ok_or_else(|| MonitorError::Config("container_stats requires containerId".into()))?;
                if !self.registry.contains(host_id) {
                    return Err(MonitorError::HostNotFound(host_id));
                }
                Ok(ChannelSpec::ContainerStats {
                    host_id,
                    container_id,
                })
            }
            Channel::AllStats => Ok(ChannelSpec::AllStats),
            Channel::Events => unreachable!("events channel has no spec"),
        }
    }

    fn install(
        &self,
        connection_id: &str,
        subscription_id: String,
        channel: Channel,
        task: Option<JoinHandle<()>>,
    ) {
        let mut connections = self.connections.lock().expect("connections lock poisoned");
        let Some(conn) = connections.get_mut(connection_id) else {
            // Connection raced away; kill the freshly spawned timer.
            if let Some(task) = task {
                task.abort();
            }
            return;
        };
        // Re-subscribing with the same id replaces the old subscription.
        conn.drop_subscription(&subscription_id);
        debug!(connection_id, subscription_id = %subscription_id, channel = channel.as_str(), "subscribed");
        conn.subscriptions
            .insert(subscription_id, Subscription { channel, task });
    }

    fn spawn_poll_task(
        &self,
        channel: Channel,
        spec: ChannelSpec,
        interval: Duration,
        sender: UnboundedSender<ServerMessage>,
    ) -> JoinHandle<()> {
        let collector = self.collector.clone();
        tokio::spawn(async move {
            // First tick one full interval after subscribe; Skip keeps a slow
            // fetch from causing a burst of catch-up ticks.
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let frame = match fetch(&collector, &spec).await {
                    Ok(value) => ServerMessage::data(channel.as_str(), value),
                    Err(err) => ServerMessage::error(Some(channel.as_str()), err.to_string()),
                };
                if sender.send(frame).is_err() {
                    // Receiver gone; the connection is being torn down.
                    break;
                }
            }
        })
    }

    fn send_to(&self, connection_id: &str, frame: ServerMessage) {
        let connections = self.connections.lock().expect("connections lock poisoned");
        if let Some(conn) = connections.get(connection_id) {
            let _ = conn.sender.send(frame);
        }
    }
}

/// One tick's backing call. Fan-out channels are infallible by construction
/// (partial failure is reported on the bus); single-target channels surface
/// their error to become an error frame.
async fn fetch(collector: &MetricsCollector, spec: &ChannelSpec) -> Result<Value> {
    let value = match spec {
        ChannelSpec::ContainerList { state } => {
            let mut containers = collector.list_all_containers().await;
            if let Some(state) = state {
                containers.retain(|c| c.state == *state);
            }
            serde_json::to_value(containers)
        }
        ChannelSpec::HostMetrics { host_id } => match host_id {
            Some(host_id) => serde_json::to_value(vec![collector.host_metrics(*host_id).await?]),
            None => serde_json::to_value(collector.all_host_metrics().await),
        },
        ChannelSpec::ContainerStats {
            host_id,
            container_id,
        } => serde_json::to_value(collector.container_stats_one(*host_id, container_id).await?),
        ChannelSpec::AllStats => serde_json::to_value(collector.all_stats().await),
    };
    value.map_err(|e| MonitorError::Engine(format!("failed to encode frame: {e}")))
}
