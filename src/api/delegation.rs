// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ApiError, AppState};
use crate::delegation::{SessionId, SessionInfo};

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub token: String,
    #[serde(default = "default_requester")]
    pub requested_by: String,
}

fn default_requester() -> String {
    "anonymous".to_string()
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: SessionId,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SessionList {
    pub active: usize,
    pub max_sessions: usize,
    pub sessions: Vec<SessionInfo>,
}

pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    let delegation = state.orchestrator.delegation();
    let session_id = delegation.create_session(&request.token, &request.requested_by).await?;

    let lifetime = chrono::Duration::from_std(delegation.session_lifetime())
        .unwrap_or_else(|_| chrono::Duration::days(36_500));
    let now = Utc::now();
    let expires_at = now.checked_add_signed(lifetime).unwrap_or(now);
    Ok((StatusCode::CREATED, Json(CreateSessionResponse { session_id, expires_at })))
}

pub async fn list(State(state): State<AppState>) -> Json<SessionList> {
    let delegation = state.orchestrator.delegation();
    let sessions = delegation.list().await;
    Json(SessionList {
        active: sessions.len(),
        max_sessions: delegation.max_sessions(),
        sessions,
    })
}

pub async fn revoke(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.orchestrator.delegation().revoke(&SessionId::from(id.as_str())).await?;
    Ok(StatusCode::NO_CONTENT)
}
