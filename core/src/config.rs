use std::time::Duration;

use crate::retry::RetryPolicy;

/// Default timeout for one outbound engine call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default health-check cadence.
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(30);

/// Default lifecycle-detection cadence.
pub const DEFAULT_EVENT_INTERVAL: Duration = Duration::from_secs(10);

/// Construction-time configuration for the monitor. Every field has a sane
/// default; callers override only what they need.
///
/// Health checks and lifecycle detection run on independent schedules so one
/// concern's cadence never couples to the other's.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Timeout applied to every engine call; a timeout counts as a
    /// transport failure.
    pub request_timeout: Duration,
    /// Bounded-retry policy wrapped around health probes and single-host
    /// metric fetches.
    pub retry: RetryPolicy,
    pub health_interval: Duration,
    pub event_interval: Duration,
    pub health_checks_enabled: bool,
    pub event_detection_enabled: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
            health_interval: DEFAULT_HEALTH_INTERVAL,
            event_interval: DEFAULT_EVENT_INTERVAL,
            health_checks_enabled: true,
            event_detection_enabled: true,
        }
    }
}

impl MonitorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    #[must_use]
    pub fn with_event_interval(mut self, interval: Duration) -> Self {
        self.event_interval = interval;
        self
    }

    #[must_use]
    pub fn with_health_checks_enabled(mut self, enabled: bool) -> Self {
        self.health_checks_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_event_detection_enabled(mut self, enabled: bool) -> Self {
        self.event_detection_enabled = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = MonitorConfig::default();
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.health_interval, DEFAULT_HEALTH_INTERVAL);
        assert!(config.health_checks_enabled);
        assert!(config.event_detection_enabled);
    }

    #[test]
    fn builders_override_single_fields() {
        let config = MonitorConfig::new()
            .with_health_interval(Duration::from_secs(5))
            .with_event_detection_enabled(false);
        assert_eq!(config.health_interval, Duration::from_secs(5));
        assert!(!config.event_detection_enabled);
        // untouched fields keep their defaults
        assert_eq!(config.event_interval, DEFAULT_EVENT_INTERVAL);
    }
}
