// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! The orchestration root.
//!
//! One [`NodeOrchestrator`] is built at boot and shared by `Arc` with the
//! HTTP layer. It owns the gate, the managers, the proxy, the delegation
//! manager and the watcher handle, and it is the only place that sequences
//! them: reservation before start, rollback on failure, proxy rebinding
//! on inference changes, and the fixed shutdown order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::NodeConfig;
use crate::delegation::DelegationManager;
use crate::gate::{ExclusivityGate, GateError, ServiceState};
use crate::health::{HealthChecker, HealthReport};
use crate::managers::{
    HealthSnapshot, ManagerError, ManagerRegistry, StartConfig, StopMode, WorkloadKind,
};
use crate::proxy::{default_rules, BackendBinding, BackendProxy, LegacyShim, ProxyError};
use crate::shutdown::{ShutdownCoordinator, ShutdownReport, ShutdownStep, StepOutcome};
use crate::telemetry::{log_event, OrchestratorEvent};
use crate::transition::TransitionTracker;
use crate::watcher::{Watcher, WatcherHandle};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Manager(#[from] ManagerError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

/// How a successful start request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    /// The workload already owned the node and was running.
    AlreadyRunning,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkloadStatus {
    pub workload: WorkloadKind,
    pub owner: bool,
    pub stop_mode: StopMode,
    pub health: HealthSnapshot,
}

pub struct NodeOrchestrator {
    gate: Arc<ExclusivityGate>,
    /// One per exclusive workload; start and stop of the same kind never overlap.
    lifecycle: [AsyncMutex<()>; 3],
    managers: ManagerRegistry,
    transitions: TransitionTracker,
    proxy: Arc<BackendProxy>,
    delegation: DelegationManager,
    coordinator: ShutdownCoordinator,
    health: HealthChecker,
    watcher: Mutex<Option<WatcherHandle>>,
    watch_interval: Duration,
    legacy_compat: bool,
    shut_down: AtomicBool,
}

impl NodeOrchestrator {
    pub fn new(
        managers: ManagerRegistry,
        proxy: BackendProxy,
        delegation: DelegationManager,
        watch_interval: Duration,
    ) -> Self {
        Self {
            gate: Arc::new(ExclusivityGate::new()),
            lifecycle: [AsyncMutex::new(()), AsyncMutex::new(()), AsyncMutex::new(())],
            managers,
            transitions: TransitionTracker::new(),
            proxy: Arc::new(proxy),
            delegation,
            coordinator: ShutdownCoordinator::new(),
            health: HealthChecker::new(),
            watcher: Mutex::new(None),
            watch_interval,
            legacy_compat: false,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Enable the legacy shim during `boot`.
    pub fn with_legacy_compat(mut self, enabled: bool) -> Self {
        self.legacy_compat = enabled;
        self
    }

    pub fn from_config(config: &NodeConfig) -> Self {
        let proxy = BackendProxy::new(
            config.proxy_timeout,
            LegacyShim::new(default_rules(), config.legacy_bind_addr),
        );
        Self::new(
            ManagerRegistry::from_config(config),
            proxy,
            DelegationManager::new(config.delegation.clone()),
            config.watch_interval,
        )
        .with_legacy_compat(config.legacy_compat)
    }

    /// Establish the proxy, start the legacy shim, then spawn the watcher.
    pub async fn boot(&self) -> Result<(), OrchestratorError> {
        let initial = if self.managers.exclusive(WorkloadKind::Inference).is_running() {
            self.inference_binding()
        } else {
            None
        };
        self.proxy.start_backend_proxy(initial).await?;

        if self.legacy_compat {
            if let Err(e) = self.proxy.start_legacy_compatibility().await {
                warn!(error = %e, "legacy compatibility unavailable; continuing without it");
            }
        }

        let watcher = Watcher::new(
            Arc::clone(&self.gate),
            self.managers.watch_list(),
            self.transitions.clone(),
            self.watch_interval,
        )
        .with_proxy(Arc::clone(&self.proxy));
        let previous = self.watcher.lock().replace(watcher.spawn());
        if let Some(previous) = previous {
            previous.cancel_token().cancel();
        }

        info!(
            watch_interval_ms = self.watch_interval.as_millis() as u64,
            legacy = self.proxy.legacy().is_enabled(),
            "orchestrator booted"
        );
        Ok(())
    }

    /// Reserve the node for `kind` and start its manager.
    pub async fn start_workload(
        &self,
        kind: WorkloadKind,
        config: StartConfig,
    ) -> Result<StartOutcome, OrchestratorError> {
        let _transition = self.transitions.begin(kind);
        let _serial = self.lifecycle_lock(kind).lock().await;

        let newly_reserved = match self.gate.check_and_reserve(kind) {
            Ok(newly_reserved) => newly_reserved,
            Err(e) => {
                log_event(
                    OrchestratorEvent::ReservationConflict,
                    "start rejected by exclusivity gate",
                    &[("requested", kind.as_str())],
                );
                return Err(e.into());
            }
        };

        match self.managers.exclusive(kind).start(config).await {
            Ok(()) => {
                if kind == WorkloadKind::Inference {
                    self.proxy.reconfigure(self.inference_binding());
                }
                log_event(
                    OrchestratorEvent::WorkloadStarted,
                    "workload started",
                    &[("workload", kind.as_str())],
                );
                Ok(StartOutcome::Started)
            }
            Err(ManagerError::AlreadyRunning(_)) => {
                if kind == WorkloadKind::Inference && self.proxy.current_binding().is_none() {
                    self.proxy.reconfigure(self.inference_binding());
                }
                Ok(StartOutcome::AlreadyRunning)
            }
            Err(e) => {
                // A reservation held before this call is not ours to undo.
                if newly_reserved {
                    self.gate.release(kind);
                }
                log_event(
                    OrchestratorEvent::WorkloadStartFailed,
                    "workload failed to start",
                    &[
                        ("workload", kind.as_str()),
                        ("error", e.to_string().as_str()),
                        ("rolled_back", if newly_reserved { "true" } else { "false" }),
                    ],
                );
                Err(e.into())
            }
        }
    }

    /// Stop `kind` through its configured path and release the node.
    pub async fn stop_workload(&self, kind: WorkloadKind) -> Result<(), OrchestratorError> {
        let _transition = self.transitions.begin(kind);
        let _serial = self.lifecycle_lock(kind).lock().await;
        let manager = self.managers.exclusive(kind);

        let result = self.managers.stop_exclusive(kind).await;
        if self.gate.release_if(kind, || !manager.is_running()) {
            log_event(
                OrchestratorEvent::WorkloadStopped,
                "workload stopped",
                &[("workload", kind.as_str())],
            );
        }
        if kind == WorkloadKind::Inference && !manager.is_running() {
            self.proxy.reconfigure(None);
        }

        if let Err(e) = &result {
            log_event(
                OrchestratorEvent::WorkloadStopFailed,
                "workload stop failed",
                &[("workload", kind.as_str()), ("error", e.to_string().as_str())],
            );
        }
        result.map_err(Into::into)
    }

    /// Stop every exclusive workload that is running or owns the node.
    pub async fn stop_all(&self) -> Vec<(WorkloadKind, Result<(), OrchestratorError>)> {
        let owner = self.gate.current().owner();
        let mut results = Vec::new();
        for kind in WorkloadKind::ALL {
            if owner == Some(kind) || self.managers.exclusive(kind).is_running() {
                results.push((kind, self.stop_workload(kind).await));
            }
        }
        results
    }

    pub fn status(&self, kind: WorkloadKind) -> WorkloadStatus {
        WorkloadStatus {
            workload: kind,
            owner: self.gate.current().owner() == Some(kind),
            stop_mode: self.managers.stop_mode(kind),
            health: self.managers.exclusive(kind).health(),
        }
    }

    pub fn service_state(&self) -> ServiceState {
        self.gate.current()
    }

    pub fn health_report(&self) -> HealthReport {
        self.health.report(self.coordinator.state(), self.gate.current(), self.managers.snapshots())
    }

    pub fn gate(&self) -> &Arc<ExclusivityGate> {
        &self.gate
    }

    pub fn managers(&self) -> &ManagerRegistry {
        &self.managers
    }

    pub fn proxy(&self) -> &Arc<BackendProxy> {
        &self.proxy
    }

    pub fn delegation(&self) -> &DelegationManager {
        &self.delegation
    }

    pub fn coordinator(&self) -> &ShutdownCoordinator {
        &self.coordinator
    }

    pub fn transitions(&self) -> &TransitionTracker {
        &self.transitions
    }

    fn lifecycle_lock(&self, kind: WorkloadKind) -> &AsyncMutex<()> {
        match kind {
            WorkloadKind::Mining => &self.lifecycle[0],
            WorkloadKind::Training => &self.lifecycle[1],
            WorkloadKind::Inference => &self.lifecycle[2],
        }
    }

    fn inference_binding(&self) -> Option<BackendBinding> {
        let endpoints = self.managers.exclusive(WorkloadKind::Inference).serving_endpoints();
        if endpoints.is_empty() {
            warn!("inference is running but reports no serving endpoints");
            return None;
        }
        match BackendBinding::new(&endpoints) {
            Ok(binding) => Some(binding),
            Err(e) => {
                warn!(error = %e, "inference endpoints unusable");
                None
            }
        }
    }

    async fn shutdown_workload(&self, kind: WorkloadKind) -> StepOutcome {
        let manager = self.managers.exclusive(kind);
        if !manager.is_running() {
            self.gate.release(kind);
            return StepOutcome::Skipped;
        }
        match self.stop_workload(kind).await {
            Ok(()) => StepOutcome::Completed,
            Err(e) => StepOutcome::Failed(e.to_string()),
        }
    }

    /// Run the fixed teardown sequence. Every step runs even if an earlier
    /// one fails; a second call returns an empty report.
    pub async fn shutdown(&self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return report;
        }
        info!("orchestrator shutdown started");

        for (step, kind) in [
            (ShutdownStep::StopMining, WorkloadKind::Mining),
            (ShutdownStep::StopInference, WorkloadKind::Inference),
            (ShutdownStep::StopTraining, WorkloadKind::Training),
        ] {
            let outcome = self.shutdown_workload(kind).await;
            report.record(step, outcome);
        }

        report.sessions_purged = self.delegation.stop().await;
        report.record(ShutdownStep::PurgeDelegation, StepOutcome::Completed);

        let outcome = match self.managers.hardware().release_handle() {
            Ok(()) => StepOutcome::Completed,
            Err(e) => StepOutcome::Failed(e.to_string()),
        };
        report.record(ShutdownStep::ReleaseHardware, outcome);

        let backend = self.proxy.stop_backend_proxy().await;
        let legacy = self.proxy.stop_legacy_compatibility().await;
        let outcome = match (backend, legacy) {
            (Ok(()), Ok(())) => StepOutcome::Completed,
            (Err(e), _) | (_, Err(e)) => StepOutcome::Failed(e.to_string()),
        };
        report.record(ShutdownStep::StopProxy, outcome);

        let handle = self.watcher.lock().take();
        let outcome = match handle {
            Some(handle) => {
                report.watcher = handle.shutdown().await;
                StepOutcome::Completed
            }
            None => StepOutcome::Skipped,
        };
        report.record(ShutdownStep::CancelWatcher, outcome);

        for (step, detail) in report.failures() {
            log_event(
                OrchestratorEvent::ShutdownStepFailed,
                "shutdown step failed",
                &[("step", step.as_str()), ("error", detail)],
            );
        }
        info!(clean = report.is_clean(), "orchestrator shutdown complete");
        report
    }
}
