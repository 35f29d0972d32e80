// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! Hardware monitor - the always-on, non-exclusive workload.
//!
//! Wraps a native telemetry session that must be released exactly once.
//! The session itself (NVML or similar) lives behind [`TelemetrySession`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::{HealthSnapshot, ManagedKind, ManagerError, ManagerLifecycle, StartConfig};
use crate::telemetry::{log_event, OrchestratorEvent};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("Telemetry session already released")]
    Released,

    #[error("Telemetry session error: {0}")]
    Session(String),
}

/// Accelerator family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuBackend {
    Cuda,
    Rocm,
    #[default]
    Cpu,
}

impl fmt::Display for GpuBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuBackend::Cuda => write!(f, "CUDA"),
            GpuBackend::Rocm => write!(f, "ROCm"),
            GpuBackend::Cpu => write!(f, "CPU"),
        }
    }
}

/// One device reported by the telemetry session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuDevice {
    pub backend: GpuBackend,
    pub index: usize,
    pub name: String,
    pub total_memory: u64,
    pub available_memory: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utilization_pct: Option<u32>,
}

impl GpuDevice {
    /// The CPU fallback device.
    pub fn cpu() -> Self {
        Self {
            backend: GpuBackend::Cpu,
            index: 0,
            name: "CPU".to_string(),
            total_memory: 0,
            available_memory: 0,
            temperature_c: None,
            utilization_pct: None,
        }
    }

    /// Memory in use as a fraction of total.
    pub fn memory_utilization(&self) -> f32 {
        if self.total_memory == 0 {
            return 0.0;
        }
        ((self.total_memory - self.available_memory.min(self.total_memory)) as f64
            / self.total_memory as f64) as f32
    }
}

/// Native telemetry boundary.
pub trait TelemetrySession: Send + Sync {
    fn devices(&self) -> Result<Vec<GpuDevice>, TelemetryError>;

    /// Release the native session. Called at most once by [`HardwareMonitor`].
    fn shutdown(&self) -> Result<(), TelemetryError>;
}

/// Session used when no native telemetry library is present.
#[derive(Debug, Default)]
pub struct DetachedSession;

impl TelemetrySession for DetachedSession {
    fn devices(&self) -> Result<Vec<GpuDevice>, TelemetryError> {
        Ok(Vec::new())
    }

    fn shutdown(&self) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// Serializable monitor summary.
#[derive(Debug, Clone, Serialize)]
pub struct HardwareStatus {
    pub released: bool,
    pub accelerator_available: bool,
    pub device_count: usize,
    pub devices: Vec<GpuDevice>,
}

/// Always-on monitor over a telemetry session.
pub struct HardwareMonitor {
    session: Arc<dyn TelemetrySession>,
    released: AtomicBool,
    started_at: Instant,
}

impl HardwareMonitor {
    pub fn new(session: Arc<dyn TelemetrySession>) -> Self {
        Self { session, released: AtomicBool::new(false), started_at: Instant::now() }
    }

    /// Devices reported by the session, falling back to the CPU.
    pub fn devices(&self) -> Result<Vec<GpuDevice>, TelemetryError> {
        if self.is_released() {
            return Err(TelemetryError::Released);
        }
        let mut devices = self.session.devices()?;
        if devices.is_empty() {
            devices.push(GpuDevice::cpu());
        }
        Ok(devices)
    }

    pub fn status(&self) -> Result<HardwareStatus, TelemetryError> {
        let devices = self.devices()?;
        Ok(HardwareStatus {
            released: false,
            accelerator_available: devices.iter().any(|d| d.backend != GpuBackend::Cpu),
            device_count: devices.len(),
            devices,
        })
    }

    /// Release the native session. Idempotent; only the first call reaches it.
    pub fn release_handle(&self) -> Result<(), TelemetryError> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let result = self.session.shutdown();
        if result.is_ok() {
            log_event(OrchestratorEvent::TelemetryReleased, "hardware telemetry session released", &[]);
        }
        result
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ManagerLifecycle for HardwareMonitor {
    fn kind(&self) -> ManagedKind {
        ManagedKind::HardwareMonitor
    }

    /// The session is acquired at construction; it cannot be reacquired.
    async fn start(&self, _config: StartConfig) -> Result<(), ManagerError> {
        if self.is_released() {
            return Err(ManagerError::start_failure(
                ManagedKind::HardwareMonitor,
                "telemetry session released",
            ));
        }
        Err(ManagerError::AlreadyRunning(ManagedKind::HardwareMonitor))
    }

    fn stop(&self) -> Result<(), ManagerError> {
        self.release_handle()
            .map_err(|e| ManagerError::stop_failure(ManagedKind::HardwareMonitor, e.to_string()))
    }

    fn is_running(&self) -> bool {
        !self.is_released()
    }

    fn health(&self) -> HealthSnapshot {
        if self.is_released() {
            return HealthSnapshot::stopped(ManagedKind::HardwareMonitor)
                .with_detail("telemetry session released");
        }
        let snapshot = HealthSnapshot {
            uptime_secs: Some(self.started_at.elapsed().as_secs()),
            ..HealthSnapshot::running(ManagedKind::HardwareMonitor)
        };
        match self.session.devices() {
            Ok(devices) => snapshot.with_detail(format!("{} device(s)", devices.len().max(1))),
            Err(e) => HealthSnapshot { healthy: false, ..snapshot.with_detail(e.to_string()) },
        }
    }
}

impl Drop for HardwareMonitor {
    fn drop(&mut self) {
        if let Err(e) = self.release_handle() {
            warn!(error = %e, "telemetry session release failed on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_fallback_when_no_devices() {
        let monitor = HardwareMonitor::new(Arc::new(DetachedSession));
        let devices = monitor.devices().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].backend, GpuBackend::Cpu);
        assert!(!monitor.status().unwrap().accelerator_available);
    }

    #[test]
    fn test_memory_utilization() {
        let device = GpuDevice {
            backend: GpuBackend::Cuda,
            index: 0,
            name: "A100".into(),
            total_memory: 100,
            available_memory: 25,
            temperature_c: None,
            utilization_pct: None,
        };
        assert!((device.memory_utilization() - 0.75).abs() < f32::EPSILON);
        assert_eq!(GpuDevice::cpu().memory_utilization(), 0.0);
    }

    #[test]
    fn test_devices_unavailable_after_release() {
        let monitor = HardwareMonitor::new(Arc::new(DetachedSession));
        monitor.release_handle().unwrap();
        assert_eq!(monitor.devices(), Err(TelemetryError::Released));
        assert!(!monitor.is_running());
    }
}
