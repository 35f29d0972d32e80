// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! Model catalog handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use super::{ApiError, AppState};
use crate::managers::ModelEntry;

#[derive(Debug, Deserialize)]
pub struct RegisterModel {
    pub id: String,
    #[serde(default)]
    pub source: Option<String>,
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<ModelEntry>>, ApiError> {
    Ok(Json(state.orchestrator.managers().models().list()?))
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterModel>,
) -> Result<(StatusCode, Json<ModelEntry>), ApiError> {
    let entry = state.orchestrator.managers().models().register(&request.id, request.source)?;
    tracing::info!(model = %entry.id, "model registered");
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ModelEntry>, ApiError> {
    Ok(Json(state.orchestrator.managers().models().get(&id)?))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ModelEntry>, ApiError> {
    let entry = state.orchestrator.managers().models().remove(&id)?;
    tracing::info!(model = %entry.id, "model removed");
    Ok(Json(entry))
}
