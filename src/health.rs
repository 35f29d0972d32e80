// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! Liveness and health reporting for `/health`.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::gate::ServiceState;
use crate::managers::HealthSnapshot;
use crate::shutdown::ShutdownState;

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthState,
    pub accepting_requests: bool,
    pub service_state: ServiceState,
    pub node_id: String,
    pub uptime_secs: u64,
    pub managers: Vec<HealthSnapshot>,
}

/// Aggregates component health into one report.
pub struct HealthChecker {
    node_id: String,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new() -> Self {
        let node_id = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        Self::with_node_id(node_id)
    }

    pub fn with_node_id(node_id: impl Into<String>) -> Self {
        Self { node_id: node_id.into(), start_time: Instant::now() }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn report(
        &self,
        shutdown_state: ShutdownState,
        service_state: ServiceState,
        managers: Vec<HealthSnapshot>,
    ) -> HealthReport {
        HealthReport {
            status: Self::compute_state(shutdown_state, &managers),
            accepting_requests: shutdown_state == ShutdownState::Running,
            service_state,
            node_id: self.node_id.clone(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            managers,
        }
    }

    fn compute_state(shutdown_state: ShutdownState, managers: &[HealthSnapshot]) -> HealthState {
        if shutdown_state != ShutdownState::Running {
            return HealthState::Unhealthy;
        }
        if managers.iter().any(|m| !m.healthy) {
            return HealthState::Degraded;
        }
        HealthState::Healthy
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}
