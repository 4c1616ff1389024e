//! Multi-host container monitoring and streaming.
//!
//! One operator process observes containers across many independently
//! reachable engine hosts: a host registry feeds a health monitor, a metrics
//! collector, and a lifecycle event detector, all of which publish to a typed
//! event bus; a stream manager turns periodic pulls into push-style frames
//! for any number of concurrent subscribers, each on its own refresh
//! schedule.
//!
//! One unreachable host degrades coverage, never availability: every fan-out
//! settles all branches, keeps the successes, and reports failures
//! out-of-band as [`events::MonitorEvent::Error`].

pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod monitor;
pub mod registry;
pub mod retry;
pub mod services;
pub mod stream;
pub mod types;

pub use config::MonitorConfig;
pub use error::{MonitorError, Result};
pub use events::{EventBus, EventKind, HandlerId, MonitorEvent};
pub use gateway::{
    EngineGateway, EngineInfo, GatewayProvider, HttpEngineGateway, HttpGatewayProvider,
    StatsSample,
};
pub use monitor::FleetMonitor;
pub use registry::{HostRegistry, HostStore};
pub use retry::{with_retry, RetryPolicy};
pub use services::{EventDetector, HealthMonitor, HealthState, HealthStates, MetricsCollector};
pub use stream::{Channel, ChannelInfo, ServerMessage, ServerMessageType, StreamManager};
pub use types::{
    now_millis, AllStats, ContainerSnapshot, ContainerState, ContainerStats, DiskUsage, Host,
    HostMetrics, PortMapping,
};
