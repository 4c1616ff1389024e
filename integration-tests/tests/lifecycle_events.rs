use std::sync::Arc;
use std::time::Duration;

use fleetmon_core::{
    ContainerState, EventBus, EventDetector, EventKind, HealthStates, HostRegistry,
    MetricsCollector, MonitorConfig, MonitorEvent, RetryPolicy,
};

use crate::common::{container, host, monitor_with, EventRecorder, MockFleet};

#[tokio::test(start_paused = true)]
async fn first_poll_seeds_baseline_then_diffs_exactly() {
    let fleet = MockFleet::new();
    let sim = fleet.sim(1);
    sim.set_containers(vec![
        container("c1", 1, ContainerState::Running),
        container("c2", 1, ContainerState::Running),
        container("c3", 1, ContainerState::Running),
    ]);

    let config = MonitorConfig::new()
        .with_retry(RetryPolicy::no_retry())
        .with_health_checks_enabled(false)
        .with_event_interval(Duration::from_secs(1));
    let monitor = monitor_with(&fleet, config);
    let recorder = EventRecorder::attach(&monitor);
    monitor.add_host(host(1, "node-1")).await.unwrap();

    monitor.start_monitoring();

    // First poll sees three pre-existing containers and emits nothing.
    tokio::time::advance(Duration::from_millis(10)).await;
    assert_eq!(recorder.count(EventKind::ContainerStarted), 0);
    assert_eq!(recorder.count(EventKind::ContainerStopped), 0);

    // One appears, one disappears: exactly one event each, correct ids.
    sim.add_container(container("c4", 1, ContainerState::Running));
    sim.remove_container("c1");
    tokio::time::advance(Duration::from_secs(1)).await;

    let started = recorder.of_kind(EventKind::ContainerStarted);
    let stopped = recorder.of_kind(EventKind::ContainerStopped);
    assert_eq!(started.len(), 1);
    assert_eq!(stopped.len(), 1);
    match &started[0] {
        MonitorEvent::ContainerStarted { host_id, container } => {
            assert_eq!(*host_id, 1);
            assert_eq!(container.id, "c4");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    // The stopped container is gone from the engine; the event carries its
    // last known snapshot.
    match &stopped[0] {
        MonitorEvent::ContainerStopped { host_id, container } => {
            assert_eq!(*host_id, 1);
            assert_eq!(container.id, "c1");
            assert_eq!(container.name, "svc-c1");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // Steady state: no further events.
    recorder.clear();
    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(recorder.count(EventKind::ContainerStarted), 0);
    assert_eq!(recorder.count(EventKind::ContainerStopped), 0);
}

#[tokio::test(start_paused = true)]
async fn poll_completing_after_host_removal_is_discarded() {
    let fleet = MockFleet::new();
    let sim = fleet.sim(1);
    sim.set_containers(vec![container("c1", 1, ContainerState::Running)]);

    let registry = Arc::new(HostRegistry::in_memory());
    let bus = EventBus::new();
    let states = Arc::new(HealthStates::default());
    let collector = Arc::new(MetricsCollector::new(
        registry.clone(),
        fleet.clone(),
        states,
        bus.clone(),
        RetryPolicy::no_retry(),
    ));
    let detector = Arc::new(EventDetector::new(registry.clone(), collector, bus.clone()));
    let recorder = EventRecorder::attach_bus(&bus);

    registry.add_host(host(1, "node-1")).await.unwrap();
    detector.poll_host(1).await.unwrap();

    // Second poll suspends on a slow engine; the host is removed meanwhile.
    sim.set_latency(Duration::from_secs(5));
    let in_flight = {
        let detector = detector.clone();
        tokio::spawn(async move { detector.poll_host(1).await })
    };
    tokio::time::advance(Duration::from_millis(10)).await;

    registry.remove_host(1).await.unwrap();
    detector.forget_host(1);
    sim.add_container(container("c2", 1, ContainerState::Running));

    tokio::time::advance(Duration::from_secs(6)).await;
    in_flight.await.unwrap().unwrap();

    // The late result was discarded: no events, no resurrected baseline.
    assert_eq!(recorder.count(EventKind::ContainerStarted), 0);
    assert_eq!(recorder.count(EventKind::ContainerStopped), 0);

    // Re-adding the host starts from a fresh baseline: the poll seeds again
    // and stays silent about the two pre-existing containers.
    sim.set_latency(Duration::ZERO);
    registry.add_host(host(1, "node-1")).await.unwrap();
    detector.poll_host(1).await.unwrap();
    assert_eq!(recorder.count(EventKind::ContainerStarted), 0);
    assert_eq!(recorder.count(EventKind::ContainerStopped), 0);
}

#[tokio::test(start_paused = true)]
async fn overlapping_polls_for_one_host_are_skipped() {
    let fleet = MockFleet::new();
    let sim = fleet.sim(1);
    sim.set_containers(vec![container("c1", 1, ContainerState::Running)]);
    sim.set_latency(Duration::from_secs(5));

    let registry = Arc::new(HostRegistry::in_memory());
    let bus = EventBus::new();
    let states = Arc::new(HealthStates::default());
    let collector = Arc::new(MetricsCollector::new(
        registry.clone(),
        fleet.clone(),
        states,
        bus.clone(),
        RetryPolicy::no_retry(),
    ));
    let detector = Arc::new(EventDetector::new(registry.clone(), collector, bus));

    registry.add_host(host(1, "node-1")).await.unwrap();

    let slow = {
        let detector = detector.clone();
        tokio::spawn(async move { detector.poll_host(1).await })
    };
    tokio::time::advance(Duration::from_millis(10)).await;
    assert_eq!(sim.list_count.load(std::sync::atomic::Ordering::SeqCst), 1);

    // Second poll while the first is suspended: skip, don't queue.
    detector.poll_host(1).await.unwrap();
    assert_eq!(sim.list_count.load(std::sync::atomic::Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(5)).await;
    slow.await.unwrap().unwrap();
}
