// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! Background reconciliation of manager state against the gate.
//!
//! Every cycle polls the exclusive managers in order. A manager that stopped
//! running while it still owns the node has crashed: the gate is released
//! for it, and if it was serving inference the proxy binding is dropped.
//! Only cancellation ends the loop.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::gate::ExclusivityGate;
use crate::managers::{ManagerLifecycle, WorkloadKind};
use crate::proxy::BackendProxy;
use crate::telemetry::{log_event, OrchestratorEvent};
use crate::transition::TransitionTracker;

/// Summary handed back when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherExit {
    pub cycles: u64,
    pub crashes_detected: u64,
}

/// What one cycle observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub crashed: Vec<WorkloadKind>,
    pub drifted: Vec<WorkloadKind>,
    pub failed_queries: Vec<WorkloadKind>,
}

pub struct Watcher {
    gate: Arc<ExclusivityGate>,
    targets: Vec<(WorkloadKind, Arc<dyn ManagerLifecycle>)>,
    transitions: TransitionTracker,
    interval: Duration,
    proxy: Option<Arc<BackendProxy>>,
}

impl Watcher {
    pub fn new(
        gate: Arc<ExclusivityGate>,
        targets: Vec<(WorkloadKind, Arc<dyn ManagerLifecycle>)>,
        transitions: TransitionTracker,
        interval: Duration,
    ) -> Self {
        Self { gate, targets, transitions, interval, proxy: None }
    }

    /// Drop the serving binding when inference crashes.
    pub fn with_proxy(mut self, proxy: Arc<BackendProxy>) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Poll every target once.
    pub fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        for (kind, manager) in &self.targets {
            let kind = *kind;
            let polled = catch_unwind(AssertUnwindSafe(|| (manager.is_running(), manager.health())));
            let (running, health) = match polled {
                Ok(result) => result,
                Err(_) => {
                    warn!(workload = %kind, "manager query panicked; skipping this cycle");
                    report.failed_queries.push(kind);
                    continue;
                }
            };

            let owner = self.gate.current().owner();
            match (running, owner == Some(kind)) {
                (false, true) => {
                    if self.transitions.in_transition(kind) {
                        debug!(workload = %kind, "owner not running yet; transition in progress");
                        continue;
                    }
                    let released =
                        self.gate.release_if(kind, || !self.transitions.in_transition(kind));
                    if !released {
                        continue;
                    }
                    report.crashed.push(kind);
                    metrics::counter!("node_workload_crashes_total", "workload" => kind.as_str())
                        .increment(1);
                    let detail = health.detail.unwrap_or_default();
                    log_event(
                        OrchestratorEvent::WorkloadCrashed,
                        "workload stopped while owning the node; released",
                        &[("workload", kind.as_str()), ("detail", detail.as_str())],
                    );
                    if kind == WorkloadKind::Inference {
                        if let Some(proxy) = &self.proxy {
                            proxy.reconfigure(None);
                        }
                    }
                }
                (true, false) if !self.transitions.in_transition(kind) => {
                    report.drifted.push(kind);
                    metrics::counter!("node_workload_state_drift_total", "workload" => kind.as_str())
                        .increment(1);
                    let owner = owner.map(|o| o.as_str()).unwrap_or("none");
                    log_event(
                        OrchestratorEvent::StateDrift,
                        "workload running without owning the node",
                        &[("workload", kind.as_str()), ("owner", owner)],
                    );
                }
                _ => {}
            }
        }

        report
    }

    /// Run until cancelled.
    pub async fn run(self, cancel: CancellationToken) -> WatcherExit {
        let mut exit = WatcherExit::default();
        info!(interval_ms = self.interval.as_millis() as u64, "watcher started");

        while !cancel.is_cancelled() {
            let report = self.run_cycle();
            exit.cycles += 1;
            exit.crashes_detected += report.crashed.len() as u64;

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(cycles = exit.cycles, crashes = exit.crashes_detected, "watcher stopped");
        exit
    }

    pub fn spawn(self) -> WatcherHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(cancel.clone()));
        WatcherHandle { cancel, task }
    }
}

/// Owner's side of a spawned watcher.
pub struct WatcherHandle {
    cancel: CancellationToken,
    task: JoinHandle<WatcherExit>,
}

impl WatcherHandle {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel and wait for the loop. A cancelled task is not an error.
    pub async fn shutdown(self) -> Option<WatcherExit> {
        self.cancel.cancel();
        match self.task.await {
            Ok(exit) => Some(exit),
            Err(e) if e.is_cancelled() => None,
            Err(e) => {
                warn!(error = %e, "watcher task failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::{ManagedKind, MockManager};

    #[test]
    fn test_cycle_with_nothing_owned_is_quiet() {
        let gate = Arc::new(ExclusivityGate::new());
        let mining: Arc<dyn ManagerLifecycle> = Arc::new(MockManager::new(ManagedKind::Mining));
        let watcher = Watcher::new(
            gate,
            vec![(WorkloadKind::Mining, mining)],
            TransitionTracker::new(),
            Duration::from_millis(10),
        );
        assert_eq!(watcher.run_cycle(), CycleReport::default());
    }

    #[tokio::test]
    async fn test_aborted_task_is_swallowed() {
        let gate = Arc::new(ExclusivityGate::new());
        let watcher = Watcher::new(gate, Vec::new(), TransitionTracker::new(), Duration::from_secs(60));
        let handle = watcher.spawn();
        handle.task.abort();
        assert_eq!(handle.shutdown().await, None);
    }
}
