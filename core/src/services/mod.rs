pub mod event_detector;
pub mod health_monitor;
pub mod metrics_collector;

pub use event_detector::EventDetector;
pub use health_monitor::{HealthMonitor, HealthState, HealthStates};
pub use metrics_collector::MetricsCollector;
