// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! Exclusivity gate - at most one exclusive workload owns the node.
//!
//! The check and the reservation happen inside one synchronous critical
//! section. `parking_lot::Mutex` guards cannot be held across an `.await`,
//! so a second start request always observes the first one's reservation.

use std::fmt;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::managers::WorkloadKind;

/// Which exclusive workload, if any, owns the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "workload", rename_all = "snake_case")]
pub enum ServiceState {
    Stopped,
    OwnedBy(WorkloadKind),
}

impl ServiceState {
    pub fn owner(&self) -> Option<WorkloadKind> {
        match self {
            Self::Stopped => None,
            Self::OwnedBy(kind) => Some(*kind),
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("stopped"),
            Self::OwnedBy(kind) => write!(f, "owned-by({kind})"),
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GateError {
    #[error("{requested} cannot start while {current} owns the node")]
    Conflict { current: WorkloadKind, requested: WorkloadKind },
}

pub struct ExclusivityGate {
    state: Mutex<ServiceState>,
}

impl ExclusivityGate {
    pub fn new() -> Self {
        Self { state: Mutex::new(ServiceState::Stopped) }
    }

    /// Reserve the node for `kind`. Idempotent for the current owner.
    ///
    /// Returns `true` when this call took the node from `Stopped`, `false`
    /// when `kind` already owned it.
    pub fn check_and_reserve(&self, kind: WorkloadKind) -> Result<bool, GateError> {
        let mut state = self.state.lock();
        match *state {
            ServiceState::Stopped => {
                *state = ServiceState::OwnedBy(kind);
                info!(workload = %kind, "node reserved");
                Ok(true)
            }
            ServiceState::OwnedBy(owner) if owner == kind => Ok(false),
            ServiceState::OwnedBy(owner) => {
                metrics::counter!("node_gate_conflicts_total", "requested" => kind.as_str())
                    .increment(1);
                debug!(owner = %owner, requested = %kind, "reservation rejected");
                Err(GateError::Conflict { current: owner, requested: kind })
            }
        }
    }

    /// Release the node if `kind` owns it. Returns whether anything changed.
    pub fn release(&self, kind: WorkloadKind) -> bool {
        self.release_if(kind, || true)
    }

    /// Release the node if `kind` owns it and `confirm` holds.
    ///
    /// `confirm` runs under the gate lock, so no reservation can slip in
    /// between the ownership check and the predicate.
    pub fn release_if(&self, kind: WorkloadKind, confirm: impl FnOnce() -> bool) -> bool {
        let mut state = self.state.lock();
        if *state != ServiceState::OwnedBy(kind) || !confirm() {
            return false;
        }
        *state = ServiceState::Stopped;
        info!(workload = %kind, "node released");
        true
    }

    pub fn current(&self) -> ServiceState {
        *self.state.lock()
    }
}

impl Default for ExclusivityGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_stopped() {
        assert_eq!(ExclusivityGate::new().current(), ServiceState::Stopped);
        assert_eq!(ServiceState::Stopped.owner(), None);
    }

    #[test]
    fn test_reserve_reports_new_reservation() {
        let gate = ExclusivityGate::new();
        assert_eq!(gate.check_and_reserve(WorkloadKind::Mining), Ok(true));
        assert_eq!(gate.check_and_reserve(WorkloadKind::Mining), Ok(false));
    }

    #[test]
    fn test_release_if_declined_keeps_owner() {
        let gate = ExclusivityGate::new();
        gate.check_and_reserve(WorkloadKind::Training).unwrap();
        assert!(!gate.release_if(WorkloadKind::Training, || false));
        assert_eq!(gate.current(), ServiceState::OwnedBy(WorkloadKind::Training));
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_value(ServiceState::OwnedBy(WorkloadKind::Inference)).unwrap();
        assert_eq!(json, serde_json::json!({"state": "owned_by", "workload": "inference"}));
        let json = serde_json::to_value(ServiceState::Stopped).unwrap();
        assert_eq!(json, serde_json::json!({"state": "stopped"}));
    }
}
