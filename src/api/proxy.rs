// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! Proxy binding and legacy shim handlers.

use axum::extract::State;
use axum::Json;

use super::{ApiError, AppState};
use crate::proxy::ProxyStatus;

pub async fn status(State(state): State<AppState>) -> Json<ProxyStatus> {
    Json(state.orchestrator.proxy().status())
}

pub async fn start_legacy(State(state): State<AppState>) -> Result<Json<ProxyStatus>, ApiError> {
    let proxy = state.orchestrator.proxy();
    proxy.start_legacy_compatibility().await?;
    Ok(Json(proxy.status()))
}

pub async fn stop_legacy(State(state): State<AppState>) -> Result<Json<ProxyStatus>, ApiError> {
    let proxy = state.orchestrator.proxy();
    proxy.stop_legacy_compatibility().await?;
    Ok(Json(proxy.status()))
}
