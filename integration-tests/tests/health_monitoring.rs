use std::time::Duration;

use fleetmon_core::{EventKind, MonitorConfig, MonitorEvent, RetryPolicy};

use crate::common::{host, monitor_with, EventRecorder, MockFleet};

fn assert_health_changed(event: &MonitorEvent, expect_host: i64, expect_healthy: bool) {
    match event {
        MonitorEvent::HealthChanged { host_id, healthy } => {
            assert_eq!(*host_id, expect_host);
            assert_eq!(*healthy, expect_healthy);
        }
        other => panic!("expected HealthChanged, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn check_all_returns_one_entry_per_host_even_with_failures() {
    let fleet = MockFleet::new();
    fleet.sim(2).set_unreachable(true);

    let config =
        MonitorConfig::new().with_retry(RetryPolicy::new(2, Duration::from_millis(100)));
    let monitor = monitor_with(&fleet, config);
    for id in 1..=3 {
        monitor.add_host(host(id, &format!("node-{id}"))).await.unwrap();
    }

    let result = monitor.check_all_hosts_health().await;

    assert_eq!(result.len(), 3);
    assert_eq!(result[&1], true);
    assert_eq!(result[&2], false);
    assert_eq!(result[&3], true);
}

#[tokio::test(start_paused = true)]
async fn one_transition_event_per_check_despite_retries() {
    let fleet = MockFleet::new();
    fleet.sim(1).set_unreachable(true);

    let config =
        MonitorConfig::new().with_retry(RetryPolicy::new(3, Duration::from_millis(100)));
    let monitor = monitor_with(&fleet, config);
    let recorder = EventRecorder::attach(&monitor);
    monitor.add_host(host(1, "node-1")).await.unwrap();

    // Three failed attempts inside one check: exactly one transition event.
    assert!(!monitor.check_host_health(1).await.unwrap());
    let changes = recorder.of_kind(EventKind::HealthChanged);
    assert_eq!(changes.len(), 1);
    assert_health_changed(&changes[0], 1, false);

    // Still down: no flip, no event.
    recorder.clear();
    assert!(!monitor.check_host_health(1).await.unwrap());
    assert_eq!(recorder.count(EventKind::HealthChanged), 0);

    // Recovery flips once.
    fleet.sim(1).set_unreachable(false);
    assert!(monitor.check_host_health(1).await.unwrap());
    let changes = recorder.of_kind(EventKind::HealthChanged);
    assert_eq!(changes.len(), 1);
    assert_health_changed(&changes[0], 1, true);
}

#[tokio::test(start_paused = true)]
async fn stop_monitoring_halts_all_future_checks() {
    let fleet = MockFleet::new();
    let sim = fleet.sim(1);

    let config = MonitorConfig::new()
        .with_retry(RetryPolicy::no_retry())
        .with_health_interval(Duration::from_secs(1))
        .with_event_detection_enabled(false);
    let monitor = monitor_with(&fleet, config);
    let recorder = EventRecorder::attach(&monitor);
    monitor.add_host(host(1, "node-1")).await.unwrap();

    monitor.start_monitoring();
    assert!(monitor.is_monitoring());

    // Initial sweep fires immediately, then once per interval.
    tokio::time::advance(Duration::from_millis(10)).await;
    assert_eq!(sim.pings(), 1);
    tokio::time::advance(Duration::from_secs(3)).await;
    assert_eq!(sim.pings(), 4);

    monitor.stop_monitoring();
    assert!(!monitor.is_monitoring());
    recorder.clear();

    // Several intervals later: no further checks, no further events.
    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(sim.pings(), 4);
    assert!(recorder.events().is_empty());

    // Stopping twice is fine.
    monitor.stop_monitoring();
}

#[tokio::test(start_paused = true)]
async fn overlapping_checks_for_one_host_are_skipped() {
    let fleet = MockFleet::new();
    let sim = fleet.sim(1);
    sim.set_latency(Duration::from_secs(5));

    let config = MonitorConfig::new().with_retry(RetryPolicy::no_retry());
    let monitor = monitor_with(&fleet, config);
    monitor.add_host(host(1, "node-1")).await.unwrap();

    let slow = {
        let monitor = monitor.clone();
        tokio::spawn(async move { monitor.check_host_health(1).await })
    };
    tokio::time::advance(Duration::from_millis(10)).await;
    assert_eq!(sim.pings(), 1, "first check should be in flight");

    // Second check while the first is suspended: skipped, not queued, and it
    // reports the (still unknown -> false) current verdict without probing.
    let skipped = monitor.check_host_health(1).await.unwrap();
    assert!(!skipped);
    assert_eq!(sim.pings(), 1);

    tokio::time::advance(Duration::from_secs(5)).await;
    assert!(slow.await.unwrap().unwrap());
}
