// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! Workload managers and the lifecycle contract they all implement.
//!
//! The orchestration layer never looks inside a manager. It only starts,
//! stops and queries them through [`ManagerLifecycle`], so mining, training,
//! inference, the model catalog and the hardware monitor are supervised the
//! same way.

mod hardware;
mod mock;
mod models;
mod process;
mod registry;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use hardware::{
    DetachedSession, GpuBackend, GpuDevice, HardwareMonitor, HardwareStatus, TelemetryError,
    TelemetrySession,
};
pub use mock::{CountingSession, Journal, MockManager};
pub use models::{CatalogError, ModelCatalog, ModelEntry};
pub use process::{ProcessManager, ProcessSpec};
pub use registry::{ExclusiveManagers, ManagerRegistry, StopModes};

/// One of the mutually exclusive, resource-heavy workloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadKind {
    Mining,
    Training,
    Inference,
}

impl WorkloadKind {
    /// Watch and shutdown order.
    pub const ALL: [WorkloadKind; 3] = [Self::Mining, Self::Training, Self::Inference];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mining => "mining",
            Self::Training => "training",
            Self::Inference => "inference",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown workload: {0}")]
pub struct UnknownWorkload(pub String);

impl FromStr for WorkloadKind {
    type Err = UnknownWorkload;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mining" | "pow" => Ok(Self::Mining),
            "training" | "train" => Ok(Self::Training),
            "inference" => Ok(Self::Inference),
            other => Err(UnknownWorkload(other.to_string())),
        }
    }
}

/// Every kind of manager the node supervises, exclusive or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagedKind {
    Mining,
    Training,
    Inference,
    ModelRegistry,
    HardwareMonitor,
}

impl ManagedKind {
    /// The exclusive workload this manager runs, if any.
    pub fn exclusive(&self) -> Option<WorkloadKind> {
        match self {
            Self::Mining => Some(WorkloadKind::Mining),
            Self::Training => Some(WorkloadKind::Training),
            Self::Inference => Some(WorkloadKind::Inference),
            Self::ModelRegistry | Self::HardwareMonitor => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mining => "mining",
            Self::Training => "training",
            Self::Inference => "inference",
            Self::ModelRegistry => "model_registry",
            Self::HardwareMonitor => "hardware_monitor",
        }
    }
}

impl From<WorkloadKind> for ManagedKind {
    fn from(kind: WorkloadKind) -> Self {
        match kind {
            WorkloadKind::Mining => Self::Mining,
            WorkloadKind::Training => Self::Training,
            WorkloadKind::Inference => Self::Inference,
        }
    }
}

impl fmt::Display for ManagedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced through the lifecycle contract.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ManagerError {
    #[error("{0} is already running")]
    AlreadyRunning(ManagedKind),

    #[error("failed to start {kind}: {detail}")]
    StartFailure { kind: ManagedKind, detail: String },

    #[error("failed to stop {kind}: {detail}")]
    StopFailure { kind: ManagedKind, detail: String },
}

impl ManagerError {
    pub fn start_failure(kind: ManagedKind, detail: impl Into<String>) -> Self {
        Self::StartFailure { kind, detail: detail.into() }
    }

    pub fn stop_failure(kind: ManagedKind, detail: impl Into<String>) -> Self {
        Self::StopFailure { kind, detail: detail.into() }
    }
}

/// Opaque start parameters handed to a manager.
///
/// Every field is optional so an empty request body is a valid config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartConfig {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Point-in-time health of one manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub kind: ManagedKind,
    pub running: bool,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl HealthSnapshot {
    pub fn stopped(kind: ManagedKind) -> Self {
        Self { kind, running: false, healthy: true, pid: None, uptime_secs: None, detail: None }
    }

    pub fn running(kind: ManagedKind) -> Self {
        Self { running: true, ..Self::stopped(kind) }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Which shutdown path the orchestrator uses for a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopMode {
    /// `stop()`: returns once teardown is complete.
    Blocking,
    /// `stop_nonblocking()`: awaited, yields to other tasks while teardown waits.
    NonBlocking,
}

impl StopMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blocking => "blocking",
            Self::NonBlocking => "nonblocking",
        }
    }
}

impl FromStr for StopMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blocking" => Ok(Self::Blocking),
            "nonblocking" | "non-blocking" | "non_blocking" | "async" => Ok(Self::NonBlocking),
            other => Err(format!("invalid stop mode: {other}")),
        }
    }
}

/// Lifecycle contract shared by every workload manager.
#[async_trait]
pub trait ManagerLifecycle: Send + Sync {
    fn kind(&self) -> ManagedKind;

    /// Begin the workload. Fails with `AlreadyRunning` if active.
    async fn start(&self, config: StartConfig) -> Result<(), ManagerError>;

    /// Graceful, blocking shutdown. Stopping a stopped manager succeeds.
    fn stop(&self) -> Result<(), ManagerError>;

    /// Shutdown usable from inside the request scheduler.
    async fn stop_nonblocking(&self) -> Result<(), ManagerError> {
        self.stop()
    }

    fn is_running(&self) -> bool;

    fn health(&self) -> HealthSnapshot;

    /// Network endpoints this workload serves data-plane traffic on.
    fn serving_endpoints(&self) -> Vec<String> {
        Vec::new()
    }
}
