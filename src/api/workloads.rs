// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! Exclusive workload handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use serde::Serialize;

use super::{ApiError, AppState};
use crate::gate::ServiceState;
use crate::managers::{StartConfig, WorkloadKind};
use crate::orchestrator::{StartOutcome, WorkloadStatus};

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub workload: WorkloadKind,
    pub outcome: StartOutcome,
    pub state: ServiceState,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub workload: WorkloadKind,
    pub state: ServiceState,
}

#[derive(Debug, Serialize)]
pub struct StopAllResponse {
    pub stopped: Vec<WorkloadKind>,
    pub failed: Vec<StopFailure>,
    pub state: ServiceState,
}

#[derive(Debug, Serialize)]
pub struct StopFailure {
    pub workload: WorkloadKind,
    pub message: String,
}

/// An empty body is an empty [`StartConfig`].
fn parse_start_config(body: &Bytes) -> Result<StartConfig, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(StartConfig::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::InvalidBody(e.to_string()))
}

pub async fn start(
    State(state): State<AppState>,
    Path(workload): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<StartResponse>), ApiError> {
    let kind: WorkloadKind = workload.parse()?;
    let config = parse_start_config(&body)?;

    let outcome = state.orchestrator.start_workload(kind, config).await?;
    let status = match outcome {
        StartOutcome::Started => StatusCode::CREATED,
        StartOutcome::AlreadyRunning => StatusCode::OK,
    };
    let response =
        StartResponse { workload: kind, outcome, state: state.orchestrator.service_state() };
    Ok((status, Json(response)))
}

pub async fn stop(
    State(state): State<AppState>,
    Path(workload): Path<String>,
) -> Result<Json<StopResponse>, ApiError> {
    let kind: WorkloadKind = workload.parse()?;
    state.orchestrator.stop_workload(kind).await?;
    Ok(Json(StopResponse { workload: kind, state: state.orchestrator.service_state() }))
}

pub async fn status(
    State(state): State<AppState>,
    Path(workload): Path<String>,
) -> Result<Json<WorkloadStatus>, ApiError> {
    let kind: WorkloadKind = workload.parse()?;
    Ok(Json(state.orchestrator.status(kind)))
}

pub async fn service_state(State(state): State<AppState>) -> Json<ServiceState> {
    Json(state.orchestrator.service_state())
}

pub async fn stop_all(State(state): State<AppState>) -> (StatusCode, Json<StopAllResponse>) {
    let mut stopped = Vec::new();
    let mut failed = Vec::new();
    for (kind, result) in state.orchestrator.stop_all().await {
        match result {
            Ok(()) => stopped.push(kind),
            Err(e) => failed.push(StopFailure { workload: kind, message: e.to_string() }),
        }
    }
    let status = if failed.is_empty() { StatusCode::OK } else { StatusCode::INTERNAL_SERVER_ERROR };
    (status, Json(StopAllResponse { stopped, failed, state: state.orchestrator.service_state() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_is_default_config() {
        assert_eq!(parse_start_config(&Bytes::new()).unwrap(), StartConfig::default());
        assert_eq!(parse_start_config(&Bytes::from_static(b" \n")).unwrap(), StartConfig::default());
    }

    #[test]
    fn test_body_parsed_as_start_config() {
        let cfg = parse_start_config(&Bytes::from_static(br#"{"model":"llama-3-8b","args":["--ctx","4096"]}"#))
            .unwrap();
        assert_eq!(cfg.model.as_deref(), Some("llama-3-8b"));
        assert_eq!(cfg.args, vec!["--ctx", "4096"]);
    }

    #[test]
    fn test_malformed_body_rejected() {
        assert!(matches!(
            parse_start_config(&Bytes::from_static(b"{not json")),
            Err(ApiError::InvalidBody(_))
        ));
    }
}
