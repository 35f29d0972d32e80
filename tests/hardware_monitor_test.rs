//! Hardware monitor: single release of the telemetry session.

use std::sync::Arc;

use node_orchestrator::managers::{
    CountingSession, GpuBackend, GpuDevice, HardwareMonitor, ManagerLifecycle, StartConfig,
    TelemetryError,
};

fn cuda(index: usize) -> GpuDevice {
    GpuDevice {
        backend: GpuBackend::Cuda,
        index,
        name: format!("GPU {index}"),
        total_memory: 24 << 30,
        available_memory: 20 << 30,
        temperature_c: Some(41),
        utilization_pct: Some(3),
    }
}

#[test]
fn test_release_reaches_session_once() {
    let session = Arc::new(CountingSession::new());
    let monitor = HardwareMonitor::new(session.clone());

    monitor.release_handle().unwrap();
    monitor.release_handle().unwrap();
    monitor.stop().unwrap();
    drop(monitor);

    assert_eq!(session.shutdown_count(), 1);
}

#[test]
fn test_drop_releases_unreleased_session() {
    let session = Arc::new(CountingSession::new());
    drop(HardwareMonitor::new(session.clone()));
    assert_eq!(session.shutdown_count(), 1);
}

#[test]
fn test_reported_devices_and_status() {
    let session = Arc::new(CountingSession::new().with_devices(vec![cuda(0), cuda(1)]));
    let monitor = HardwareMonitor::new(session);

    let status = monitor.status().unwrap();
    assert!(status.accelerator_available);
    assert_eq!(status.device_count, 2);
    assert!(monitor.is_running());
    assert_eq!(monitor.health().detail.as_deref(), Some("2 device(s)"));
}

#[tokio::test]
async fn test_released_monitor_refuses_work() {
    let monitor = HardwareMonitor::new(Arc::new(CountingSession::new()));
    assert!(monitor.start(StartConfig::default()).await.is_err());

    monitor.release_handle().unwrap();
    assert!(matches!(monitor.status(), Err(TelemetryError::Released)));
    assert!(!monitor.health().running);
    assert!(monitor.start(StartConfig::default()).await.is_err());
}
