//! Background watcher: crash reconciliation, transitions, cancellation.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{eventually, FixtureBuilder};
use node_orchestrator::gate::{ExclusivityGate, ServiceState};
use node_orchestrator::managers::{
    ManagedKind, ManagerLifecycle, MockManager, StartConfig, WorkloadKind,
};
use node_orchestrator::transition::TransitionTracker;
use node_orchestrator::watcher::Watcher;

fn targets(
    mining: &Arc<MockManager>,
    training: &Arc<MockManager>,
    inference: &Arc<MockManager>,
) -> Vec<(WorkloadKind, Arc<dyn ManagerLifecycle>)> {
    vec![
        (WorkloadKind::Mining, mining.clone() as Arc<dyn ManagerLifecycle>),
        (WorkloadKind::Training, training.clone() as Arc<dyn ManagerLifecycle>),
        (WorkloadKind::Inference, inference.clone() as Arc<dyn ManagerLifecycle>),
    ]
}

#[tokio::test]
async fn test_crashed_owner_is_released_next_cycle() {
    let gate = Arc::new(ExclusivityGate::new());
    let mining = Arc::new(MockManager::new(ManagedKind::Mining));
    let training = Arc::new(MockManager::new(ManagedKind::Training));
    let inference = Arc::new(MockManager::new(ManagedKind::Inference));

    gate.check_and_reserve(WorkloadKind::Training).unwrap();
    training.start(StartConfig::default()).await.unwrap();

    let watcher = Watcher::new(
        Arc::clone(&gate),
        targets(&mining, &training, &inference),
        TransitionTracker::new(),
        Duration::from_millis(10),
    );

    assert!(watcher.run_cycle().crashed.is_empty());
    assert_eq!(gate.current(), ServiceState::OwnedBy(WorkloadKind::Training));

    training.crash();
    let report = watcher.run_cycle();
    assert_eq!(report.crashed, vec![WorkloadKind::Training]);
    assert_eq!(gate.current(), ServiceState::Stopped);
}

#[tokio::test]
async fn test_running_without_ownership_is_drift_not_crash() {
    let gate = Arc::new(ExclusivityGate::new());
    let mining = Arc::new(MockManager::new(ManagedKind::Mining));
    let training = Arc::new(MockManager::new(ManagedKind::Training));
    let inference = Arc::new(MockManager::new(ManagedKind::Inference));
    mining.start(StartConfig::default()).await.unwrap();

    let watcher = Watcher::new(
        Arc::clone(&gate),
        targets(&mining, &training, &inference),
        TransitionTracker::new(),
        Duration::from_millis(10),
    );
    let report = watcher.run_cycle();
    assert_eq!(report.drifted, vec![WorkloadKind::Mining]);
    assert!(report.crashed.is_empty());
    assert_eq!(gate.current(), ServiceState::Stopped);
}

#[tokio::test]
async fn test_mid_start_workload_is_not_reconciled() {
    let gate = Arc::new(ExclusivityGate::new());
    let mining = Arc::new(MockManager::new(ManagedKind::Mining));
    let training = Arc::new(MockManager::new(ManagedKind::Training));
    let inference = Arc::new(MockManager::new(ManagedKind::Inference));
    let transitions = TransitionTracker::new();

    // Reserved but the manager has not reported running yet.
    let guard = transitions.begin(WorkloadKind::Inference);
    gate.check_and_reserve(WorkloadKind::Inference).unwrap();

    let watcher = Watcher::new(
        Arc::clone(&gate),
        targets(&mining, &training, &inference),
        transitions.clone(),
        Duration::from_millis(10),
    );
    assert!(watcher.run_cycle().crashed.is_empty());
    assert_eq!(gate.current(), ServiceState::OwnedBy(WorkloadKind::Inference));

    // Once the transition ends without the manager running, it is a crash.
    drop(guard);
    assert_eq!(watcher.run_cycle().crashed, vec![WorkloadKind::Inference]);
}

#[tokio::test]
async fn test_slow_start_survives_watcher_through_orchestrator() {
    let fx = FixtureBuilder::new()
        .inference(|m| m.with_start_delay(Duration::from_millis(80)))
        .watch_interval(Duration::from_millis(5))
        .build();
    fx.orchestrator.boot().await.unwrap();

    fx.orchestrator.start_workload(WorkloadKind::Inference, StartConfig::default()).await.unwrap();
    assert_eq!(fx.orchestrator.service_state(), ServiceState::OwnedBy(WorkloadKind::Inference));

    let report = fx.orchestrator.shutdown().await;
    assert_eq!(report.watcher.map(|w| w.crashes_detected), Some(0));
}

#[tokio::test]
async fn test_panicking_manager_does_not_stop_the_cycle() {
    let gate = Arc::new(ExclusivityGate::new());
    let mining = Arc::new(MockManager::new(ManagedKind::Mining).panicking_queries());
    let training = Arc::new(MockManager::new(ManagedKind::Training));
    let inference = Arc::new(MockManager::new(ManagedKind::Inference));

    gate.check_and_reserve(WorkloadKind::Training).unwrap();
    let watcher = Watcher::new(
        Arc::clone(&gate),
        targets(&mining, &training, &inference),
        TransitionTracker::new(),
        Duration::from_millis(10),
    );

    let report = watcher.run_cycle();
    assert_eq!(report.failed_queries, vec![WorkloadKind::Mining]);
    // Training never started, so it is still reconciled in the same cycle.
    assert_eq!(report.crashed, vec![WorkloadKind::Training]);
}

#[tokio::test]
async fn test_cancellation_is_prompt_and_reports_exit() {
    let gate = Arc::new(ExclusivityGate::new());
    let mining = Arc::new(MockManager::new(ManagedKind::Mining));
    let training = Arc::new(MockManager::new(ManagedKind::Training));
    let inference = Arc::new(MockManager::new(ManagedKind::Inference));

    let handle = Watcher::new(
        Arc::clone(&gate),
        targets(&mining, &training, &inference),
        TransitionTracker::new(),
        Duration::from_secs(3600),
    )
    .spawn();
    tokio::task::yield_now().await;

    let started = Instant::now();
    let exit = handle.shutdown().await.expect("watcher exit summary");
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(exit.cycles <= 1);
}

#[tokio::test]
async fn test_spawned_watcher_detects_crash() {
    let fx = FixtureBuilder::new().watch_interval(Duration::from_millis(5)).build();
    fx.orchestrator.boot().await.unwrap();
    fx.orchestrator.start_workload(WorkloadKind::Mining, StartConfig::default()).await.unwrap();

    fx.mining.crash();
    let orch = Arc::clone(&fx.orchestrator);
    assert!(eventually(Duration::from_secs(2), || orch.service_state() == ServiceState::Stopped).await);

    let report = fx.orchestrator.shutdown().await;
    assert_eq!(report.watcher.map(|w| w.crashes_detected), Some(1));
}
