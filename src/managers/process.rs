// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! Command-backed workload manager.
//!
//! Mining, training and inference each run as an external program. The
//! manager spawns it, watches it with `try_wait`, and kills and reaps it on
//! stop with a bounded wait.

use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{HealthSnapshot, ManagedKind, ManagerError, ManagerLifecycle, StartConfig};

const REAP_POLL: Duration = Duration::from_millis(50);

/// How to launch a workload.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub base_args: Vec<String>,
    /// Endpoints the process serves on once started (inference only).
    pub endpoints: Vec<String>,
    /// The process must survive this long for `start` to succeed.
    pub startup_grace: Duration,
    pub stop_timeout: Duration,
}

impl ProcessSpec {
    /// Parse a whitespace-separated command line. Returns None if empty.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            base_args: parts.collect(),
            endpoints: Vec::new(),
            startup_grace: Duration::from_millis(500),
            stop_timeout: Duration::from_secs(10),
        })
    }

    pub fn with_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.endpoints = endpoints;
        self
    }
}

#[derive(Default)]
struct ProcessState {
    child: Option<Child>,
    started_at: Option<Instant>,
    last_exit: Option<String>,
}

/// Supervises one external workload process.
pub struct ProcessManager {
    kind: ManagedKind,
    spec: Option<ProcessSpec>,
    state: Mutex<ProcessState>,
}

impl ProcessManager {
    pub fn new(kind: ManagedKind, spec: Option<ProcessSpec>) -> Self {
        Self { kind, spec, state: Mutex::new(ProcessState::default()) }
    }

    fn build_command(spec: &ProcessSpec, config: &StartConfig) -> Command {
        let mut command = Command::new(&spec.program);
        command.args(&spec.base_args);
        if let Some(model) = &config.model {
            command.arg("--model").arg(model);
        }
        command.args(&config.args);
        command.envs(&config.env);
        command.stdin(Stdio::null());
        command
    }

    /// Wait for an exited child after kill, without blocking the scheduler.
    async fn reap_async(&self, mut child: Child, timeout: Duration) -> Result<(), ManagerError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    self.state.lock().last_exit = Some(status.to_string());
                    return Ok(());
                }
                Ok(None) if tokio::time::Instant::now() >= deadline => {
                    return Err(ManagerError::stop_failure(self.kind, "process did not exit in time"));
                }
                Ok(None) => tokio::time::sleep(REAP_POLL).await,
                Err(e) => return Err(ManagerError::stop_failure(self.kind, e.to_string())),
            }
        }
    }

    fn reap_blocking(&self, mut child: Child, timeout: Duration) -> Result<(), ManagerError> {
        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    self.state.lock().last_exit = Some(status.to_string());
                    return Ok(());
                }
                Ok(None) if Instant::now() >= deadline => {
                    return Err(ManagerError::stop_failure(self.kind, "process did not exit in time"));
                }
                Ok(None) => std::thread::sleep(REAP_POLL),
                Err(e) => return Err(ManagerError::stop_failure(self.kind, e.to_string())),
            }
        }
    }

    /// Take the child out of the state and signal it. None if nothing to stop.
    fn detach_and_kill(&self) -> Result<Option<Child>, ManagerError> {
        let mut state = self.state.lock();
        let Some(mut child) = state.child.take() else {
            return Ok(None);
        };
        state.started_at = None;

        if let Ok(Some(status)) = child.try_wait() {
            state.last_exit = Some(status.to_string());
            return Ok(None);
        }

        info!(workload = %self.kind, pid = child.id(), "stopping workload process");
        if let Err(e) = child.kill() {
            // Lost the race with a natural exit.
            if let Ok(Some(status)) = child.try_wait() {
                state.last_exit = Some(status.to_string());
                return Ok(None);
            }
            return Err(ManagerError::stop_failure(self.kind, e.to_string()));
        }
        Ok(Some(child))
    }

    fn stop_timeout(&self) -> Duration {
        self.spec.as_ref().map(|s| s.stop_timeout).unwrap_or(Duration::from_secs(10))
    }
}

#[async_trait]
impl ManagerLifecycle for ProcessManager {
    fn kind(&self) -> ManagedKind {
        self.kind
    }

    async fn start(&self, config: StartConfig) -> Result<(), ManagerError> {
        let spec = self
            .spec
            .as_ref()
            .ok_or_else(|| ManagerError::start_failure(self.kind, "no command configured"))?;

        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if let Some(child) = state.child.as_mut() {
                match child.try_wait() {
                    Ok(None) => return Err(ManagerError::AlreadyRunning(self.kind)),
                    Ok(Some(status)) => state.last_exit = Some(status.to_string()),
                    Err(e) => warn!(workload = %self.kind, error = %e, "stale child unreadable"),
                }
                state.child = None;
            }

            let child = Self::build_command(spec, &config)
                .spawn()
                .map_err(|e| ManagerError::start_failure(self.kind, format!("{}: {e}", spec.program)))?;
            info!(workload = %self.kind, pid = child.id(), program = %spec.program, "workload process spawned");
            state.child = Some(child);
            state.started_at = Some(Instant::now());
        }

        tokio::time::sleep(spec.startup_grace).await;

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let exited = match state.child.as_mut() {
            Some(child) => child.try_wait().map_err(|e| ManagerError::start_failure(self.kind, e.to_string()))?,
            // Stopped while we were waiting out the grace period.
            None => return Err(ManagerError::start_failure(self.kind, "stopped during startup")),
        };
        if let Some(status) = exited {
            state.child = None;
            state.started_at = None;
            state.last_exit = Some(status.to_string());
            return Err(ManagerError::start_failure(self.kind, format!("exited during startup: {status}")));
        }
        debug!(workload = %self.kind, "workload survived startup grace period");
        Ok(())
    }

    fn stop(&self) -> Result<(), ManagerError> {
        match self.detach_and_kill()? {
            Some(child) => self.reap_blocking(child, self.stop_timeout()),
            None => Ok(()),
        }
    }

    async fn stop_nonblocking(&self) -> Result<(), ManagerError> {
        match self.detach_and_kill()? {
            Some(child) => self.reap_async(child, self.stop_timeout()).await,
            None => Ok(()),
        }
    }

    fn is_running(&self) -> bool {
        let mut state = self.state.lock();
        match state.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    fn health(&self) -> HealthSnapshot {
        let mut state = self.state.lock();
        let started_at = state.started_at;
        let last_exit = state.last_exit.clone();
        let Some(child) = state.child.as_mut() else {
            let snapshot = HealthSnapshot::stopped(self.kind);
            return match last_exit {
                Some(exit) => snapshot.with_detail(format!("last exit: {exit}")),
                None => snapshot,
            };
        };

        match child.try_wait() {
            Ok(None) => HealthSnapshot {
                pid: Some(child.id()),
                uptime_secs: started_at.map(|t| t.elapsed().as_secs()),
                ..HealthSnapshot::running(self.kind)
            },
            Ok(Some(status)) => HealthSnapshot {
                healthy: false,
                ..HealthSnapshot::stopped(self.kind).with_detail(format!("exited unexpectedly: {status}"))
            },
            Err(e) => HealthSnapshot {
                healthy: false,
                ..HealthSnapshot::stopped(self.kind).with_detail(e.to_string())
            },
        }
    }

    fn serving_endpoints(&self) -> Vec<String> {
        self.spec.as_ref().map(|s| s.endpoints.clone()).unwrap_or_default()
    }
}

impl Drop for ProcessManager {
    fn drop(&mut self) {
        if let Some(mut child) = self.state.get_mut().child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
