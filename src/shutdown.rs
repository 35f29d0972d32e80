// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! Graceful shutdown.
//!
//! [`ShutdownCoordinator`] stops admission of new HTTP requests and drains
//! the in-flight ones. The fixed teardown sequence that follows is recorded
//! step by step in a [`ShutdownReport`].

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Notify;

use crate::watcher::WatcherExit;

/// Shutdown state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

/// Result of draining in-flight requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownResult {
    Complete,
    Timeout { remaining: u32 },
}

pub struct ShutdownCoordinator {
    state: RwLock<ShutdownState>,
    in_flight: Arc<AtomicU32>,
    notify: Arc<Notify>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ShutdownState::Running),
            in_flight: Arc::new(AtomicU32::new(0)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.read()
    }

    pub fn is_accepting(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Track an in-flight request. Returns None once shutdown has begun.
    pub fn track(&self) -> Option<ShutdownGuard> {
        // Held across the increment so `initiate` cannot slip in between.
        let state = self.state.read();
        if *state != ShutdownState::Running {
            return None;
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Some(ShutdownGuard { counter: Arc::clone(&self.in_flight), notify: Arc::clone(&self.notify) })
    }

    pub fn in_flight_count(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stop accepting requests and wait for in-flight ones to finish.
    pub async fn initiate(&self, timeout: Duration) -> ShutdownResult {
        *self.state.write() = ShutdownState::Draining;
        let result = self.wait_for_drain(timeout).await;
        *self.state.write() = ShutdownState::Stopped;
        result
    }

    async fn wait_for_drain(&self, timeout: Duration) -> ShutdownResult {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notified = self.notify.notified();
            let count = self.in_flight_count();
            if count == 0 {
                return ShutdownResult::Complete;
            }

            let remaining_time = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining_time.is_zero() {
                return ShutdownResult::Timeout { remaining: count };
            }

            tokio::select! {
                _ = notified => continue,
                _ = tokio::time::sleep(remaining_time) => {
                    let final_count = self.in_flight_count();
                    if final_count == 0 {
                        return ShutdownResult::Complete;
                    }
                    return ShutdownResult::Timeout { remaining: final_count };
                }
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for in-flight request tracking.
pub struct ShutdownGuard {
    counter: Arc<AtomicU32>,
    notify: Arc<Notify>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

/// The teardown sequence, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownStep {
    StopMining,
    StopInference,
    StopTraining,
    PurgeDelegation,
    ReleaseHardware,
    StopProxy,
    CancelWatcher,
}

impl ShutdownStep {
    pub const ORDER: [ShutdownStep; 7] = [
        Self::StopMining,
        Self::StopInference,
        Self::StopTraining,
        Self::PurgeDelegation,
        Self::ReleaseHardware,
        Self::StopProxy,
        Self::CancelWatcher,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StopMining => "stop_mining",
            Self::StopInference => "stop_inference",
            Self::StopTraining => "stop_training",
            Self::PurgeDelegation => "purge_delegation",
            Self::ReleaseHardware => "release_hardware",
            Self::StopProxy => "stop_proxy",
            Self::CancelWatcher => "cancel_watcher",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed,
    /// Nothing to do (workload not running, watcher never spawned).
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ShutdownReport {
    pub steps: Vec<(ShutdownStep, StepOutcome)>,
    pub sessions_purged: usize,
    #[serde(skip)]
    pub watcher: Option<WatcherExit>,
}

impl ShutdownReport {
    pub fn record(&mut self, step: ShutdownStep, outcome: StepOutcome) {
        self.steps.push((step, outcome));
    }

    pub fn executed(&self) -> Vec<ShutdownStep> {
        self.steps.iter().map(|(step, _)| *step).collect()
    }

    pub fn failures(&self) -> Vec<(ShutdownStep, &str)> {
        self.steps
            .iter()
            .filter_map(|(step, outcome)| match outcome {
                StepOutcome::Failed(detail) => Some((*step, detail.as_str())),
                _ => None,
            })
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.failures().is_empty()
    }
}
