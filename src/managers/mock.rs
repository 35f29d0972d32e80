// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! Scriptable managers for tests and local development.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    GpuDevice, HealthSnapshot, ManagedKind, ManagerError, ManagerLifecycle, StartConfig,
    TelemetryError, TelemetrySession,
};

/// Shared, ordered record of lifecycle calls.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

/// In-memory manager whose behaviour is scripted by its builder.
pub struct MockManager {
    kind: ManagedKind,
    running: AtomicBool,
    start_delay: Duration,
    stop_delay: Duration,
    fail_start: bool,
    fail_stop: bool,
    panic_on_query: bool,
    endpoints: Vec<String>,
    journal: Option<Journal>,
    starts: AtomicUsize,
}

impl MockManager {
    pub fn new(kind: ManagedKind) -> Self {
        Self {
            kind,
            running: AtomicBool::new(false),
            start_delay: Duration::ZERO,
            stop_delay: Duration::ZERO,
            fail_start: false,
            fail_stop: false,
            panic_on_query: false,
            endpoints: Vec::new(),
            journal: None,
            starts: AtomicUsize::new(0),
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Suspend inside `start` for this long before reporting success.
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// `stop_nonblocking` clears the running flag, then waits this long
    /// before returning.
    pub fn with_stop_delay(mut self, delay: Duration) -> Self {
        self.stop_delay = delay;
        self
    }

    pub fn with_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    /// `is_running` and `health` panic.
    pub fn panicking_queries(mut self) -> Self {
        self.panic_on_query = true;
        self
    }

    /// Simulate the workload dying on its own.
    pub fn crash(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Number of successful starts.
    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    fn record(&self, op: &str) {
        if let Some(journal) = &self.journal {
            journal.record(format!("{op}:{}", self.kind));
        }
    }
}

#[async_trait]
impl ManagerLifecycle for MockManager {
    fn kind(&self) -> ManagedKind {
        self.kind
    }

    async fn start(&self, _config: StartConfig) -> Result<(), ManagerError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(ManagerError::AlreadyRunning(self.kind));
        }
        self.record("start");
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        if self.fail_start {
            return Err(ManagerError::start_failure(self.kind, "scripted start failure"));
        }
        self.running.store(true, Ordering::SeqCst);
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), ManagerError> {
        self.record("stop");
        self.running.store(false, Ordering::SeqCst);
        if self.fail_stop {
            return Err(ManagerError::stop_failure(self.kind, "scripted stop failure"));
        }
        Ok(())
    }

    async fn stop_nonblocking(&self) -> Result<(), ManagerError> {
        self.record("stop_nonblocking");
        tokio::task::yield_now().await;
        self.running.store(false, Ordering::SeqCst);
        if !self.stop_delay.is_zero() {
            tokio::time::sleep(self.stop_delay).await;
        }
        if self.fail_stop {
            return Err(ManagerError::stop_failure(self.kind, "scripted stop failure"));
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        if self.panic_on_query {
            panic!("scripted query panic in {}", self.kind);
        }
        self.running.load(Ordering::SeqCst)
    }

    fn health(&self) -> HealthSnapshot {
        if self.is_running() {
            HealthSnapshot::running(self.kind)
        } else {
            HealthSnapshot::stopped(self.kind)
        }
    }

    fn serving_endpoints(&self) -> Vec<String> {
        self.endpoints.clone()
    }
}

/// Telemetry session that counts how often it is released.
#[derive(Debug, Default)]
pub struct CountingSession {
    devices: Vec<GpuDevice>,
    shutdowns: AtomicUsize,
    journal: Option<Journal>,
}

impl CountingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(mut self, devices: Vec<GpuDevice>) -> Self {
        self.devices = devices;
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl TelemetrySession for CountingSession {
    fn devices(&self) -> Result<Vec<GpuDevice>, TelemetryError> {
        Ok(self.devices.clone())
    }

    fn shutdown(&self) -> Result<(), TelemetryError> {
        let previous = self.shutdowns.fetch_add(1, Ordering::SeqCst);
        if let Some(journal) = &self.journal {
            journal.record(format!("release:{}", ManagedKind::HardwareMonitor));
        }
        if previous > 0 {
            return Err(TelemetryError::Session("session released twice".into()));
        }
        Ok(())
    }
}
