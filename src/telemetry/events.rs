// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! Lifecycle and audit events.
//!
//! Every state change the control plane makes (reservations, crashes,
//! delegation sessions, proxy rebinding) goes through [`log_event`] so it
//! lands in the log with a stable event name and in the
//! `node_events_total` counter.

use chrono::Utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorEvent {
    WorkloadStarted,
    WorkloadStopped,
    WorkloadStartFailed,
    WorkloadStopFailed,
    /// A workload stopped running while it owned the node.
    WorkloadCrashed,
    /// A workload is running without owning the node.
    StateDrift,
    ReservationConflict,
    BackendBound,
    BackendUnbound,
    LegacyShimStarted,
    LegacyShimStopped,
    LegacyShimFailed,
    SessionCreated,
    SessionRevoked,
    SessionExpired,
    SessionsPurged,
    DelegationUnauthorized,
    DelegationCapacityExceeded,
    InvalidSession,
    TelemetryReleased,
    ShutdownStepFailed,
}

impl OrchestratorEvent {
    pub fn severity(&self) -> EventSeverity {
        match self {
            Self::WorkloadStarted
            | Self::WorkloadStopped
            | Self::BackendBound
            | Self::BackendUnbound
            | Self::LegacyShimStarted
            | Self::LegacyShimStopped
            | Self::SessionCreated
            | Self::SessionRevoked
            | Self::SessionExpired
            | Self::SessionsPurged
            | Self::TelemetryReleased => EventSeverity::Info,
            Self::ReservationConflict => EventSeverity::Debug,
            Self::StateDrift
            | Self::LegacyShimFailed
            | Self::DelegationUnauthorized
            | Self::DelegationCapacityExceeded
            | Self::InvalidSession
            | Self::WorkloadCrashed => EventSeverity::Warning,
            Self::WorkloadStartFailed | Self::WorkloadStopFailed | Self::ShutdownStepFailed => {
                EventSeverity::Error
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkloadStarted => "workload_started",
            Self::WorkloadStopped => "workload_stopped",
            Self::WorkloadStartFailed => "workload_start_failed",
            Self::WorkloadStopFailed => "workload_stop_failed",
            Self::WorkloadCrashed => "workload_crashed",
            Self::StateDrift => "state_drift",
            Self::ReservationConflict => "reservation_conflict",
            Self::BackendBound => "backend_bound",
            Self::BackendUnbound => "backend_unbound",
            Self::LegacyShimStarted => "legacy_shim_started",
            Self::LegacyShimStopped => "legacy_shim_stopped",
            Self::LegacyShimFailed => "legacy_shim_failed",
            Self::SessionCreated => "session_created",
            Self::SessionRevoked => "session_revoked",
            Self::SessionExpired => "session_expired",
            Self::SessionsPurged => "sessions_purged",
            Self::DelegationUnauthorized => "delegation_unauthorized",
            Self::DelegationCapacityExceeded => "delegation_capacity_exceeded",
            Self::InvalidSession => "invalid_session",
            Self::TelemetryReleased => "telemetry_released",
            Self::ShutdownStepFailed => "shutdown_step_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

impl EventSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

/// Log an event with structured key/value details.
///
/// ```
/// use node_orchestrator::telemetry::{log_event, OrchestratorEvent};
///
/// log_event(
///     OrchestratorEvent::WorkloadCrashed,
///     "inference exited while owning the node",
///     &[("workload", "inference")],
/// );
/// ```
pub fn log_event(event: OrchestratorEvent, message: &str, details: &[(&str, &str)]) {
    let details = details
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ");
    let event_type = event.as_str();
    let timestamp = Utc::now().to_rfc3339();

    metrics::counter!("node_events_total", "event" => event_type).increment(1);

    match event.severity() {
        EventSeverity::Debug => {
            tracing::debug!(event = event_type, %timestamp, details = %details, "{message}")
        }
        EventSeverity::Info => {
            tracing::info!(event = event_type, %timestamp, details = %details, "{message}")
        }
        EventSeverity::Warning => {
            tracing::warn!(event = event_type, %timestamp, details = %details, "{message}")
        }
        EventSeverity::Error => {
            tracing::error!(event = event_type, %timestamp, details = %details, "{message}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crash_is_a_warning() {
        assert_eq!(OrchestratorEvent::WorkloadCrashed.severity(), EventSeverity::Warning);
        assert_eq!(OrchestratorEvent::WorkloadCrashed.as_str(), "workload_crashed");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(EventSeverity::Error > EventSeverity::Warning);
        assert!(EventSeverity::Warning > EventSeverity::Info);
        assert!(EventSeverity::Info > EventSeverity::Debug);
    }
}
