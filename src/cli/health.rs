// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! `health` probe: GET `/health` on a running node.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;

use super::{EXIT_CONNECTION, EXIT_HEALTHY, EXIT_UNHEALTHY};
use crate::health::HealthState;
use crate::proxy::HEALTH_PATH;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum HealthProbeError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unreadable health response: {0}")]
    Response(String),
}

/// What the node reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub http_status: u16,
    pub state: Option<HealthState>,
    pub body: String,
}

impl ProbeResult {
    /// Healthy and degraded nodes still serve requests.
    pub fn is_serving(&self) -> bool {
        self.http_status == 200
            && matches!(self.state, Some(HealthState::Healthy) | Some(HealthState::Degraded))
    }
}

/// Fetch and decode `/health` from `addr`.
pub async fn probe(addr: SocketAddr) -> Result<ProbeResult, HealthProbeError> {
    let client = Client::builder(TokioExecutor::new()).build_http::<Empty<Bytes>>();
    let uri = format!("http://{addr}{HEALTH_PATH}")
        .parse::<hyper::Uri>()
        .map_err(|e| HealthProbeError::Connection(e.to_string()))?;

    let response = tokio::time::timeout(PROBE_TIMEOUT, client.get(uri))
        .await
        .map_err(|_| HealthProbeError::Timeout(PROBE_TIMEOUT))?
        .map_err(|e| HealthProbeError::Connection(e.to_string()))?;

    let http_status = response.status().as_u16();
    let bytes = response
        .into_body()
        .collect()
        .await
        .map_err(|e| HealthProbeError::Response(e.to_string()))?
        .to_bytes();
    let body = String::from_utf8_lossy(&bytes).into_owned();
    Ok(ProbeResult { http_status, state: parse_state(&body), body })
}

fn parse_state(body: &str) -> Option<HealthState> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    serde_json::from_value(value.get("status")?.clone()).ok()
}

/// Run the probe and map the result to an exit code.
pub async fn run_health(addr: SocketAddr) -> i32 {
    match probe(addr).await {
        Ok(result) if result.is_serving() => {
            println!("{}", result.body);
            EXIT_HEALTHY
        }
        Ok(result) => {
            eprintln!("Unhealthy (HTTP {}): {}", result.http_status, result.body);
            EXIT_UNHEALTHY
        }
        Err(e) => {
            eprintln!("Health check failed: {e}");
            EXIT_CONNECTION
        }
    }
}
