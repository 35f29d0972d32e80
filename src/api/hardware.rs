// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

use axum::extract::State;
use axum::Json;

use super::{ApiError, AppState};
use crate::managers::{GpuDevice, HardwareStatus};

pub async fn devices(State(state): State<AppState>) -> Result<Json<Vec<GpuDevice>>, ApiError> {
    Ok(Json(state.orchestrator.managers().hardware().devices()?))
}

pub async fn status(State(state): State<AppState>) -> Result<Json<HardwareStatus>, ApiError> {
    Ok(Json(state.orchestrator.managers().hardware().status()?))
}
