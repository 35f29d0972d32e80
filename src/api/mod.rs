// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! HTTP surface.
//!
//! Two middleware layers sit in front of the handlers:
//!
//! - [`dispatch_middleware`] (outermost) exempts `/health`, refuses new work
//!   once shutdown has begun, and forwards every data-plane request to the
//!   bound serving backend.
//! - [`session_middleware`] (control plane only) validates the
//!   `x-delegation-session` header when a caller presents one.

mod delegation;
mod error;
mod hardware;
mod models;
mod proxy;
mod workloads;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};

pub use error::ApiError;

use crate::delegation::SessionId;
use crate::orchestrator::NodeOrchestrator;
use crate::proxy::{classify, RequestClass, HEALTH_PATH};
use crate::API_PREFIX;

/// Header carrying a delegation session id.
pub const SESSION_HEADER: &str = "x-delegation-session";

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<NodeOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<NodeOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

/// Build the full router: control plane, `/health` and the data-plane proxy.
pub fn router(state: AppState) -> Router {
    let control = Router::new()
        .route("/state", get(workloads::service_state))
        .route("/stop", post(workloads::stop_all))
        .route("/{workload}/start", post(workloads::start))
        .route("/{workload}/stop", post(workloads::stop))
        .route("/{workload}/status", get(workloads::status))
        .route("/models", get(models::list).post(models::register))
        .route("/models/{id}", get(models::get).delete(models::remove))
        .route("/gpu/devices", get(hardware::devices))
        .route("/gpu/status", get(hardware::status))
        .route("/delegation/sessions", get(delegation::list))
        .route("/delegation/sessions/{id}", delete(delegation::revoke))
        .route("/proxy", get(proxy::status))
        .route("/proxy/legacy/start", post(proxy::start_legacy))
        .route("/proxy/legacy/stop", post(proxy::stop_legacy))
        .route_layer(from_fn_with_state(state.clone(), session_middleware))
        // The token in the body is the gate for opening a session.
        .route("/delegation/sessions", post(delegation::create));

    Router::new()
        .route(HEALTH_PATH, get(health))
        .nest(API_PREFIX, control)
        .fallback(not_found)
        .layer(from_fn_with_state(state.clone(), dispatch_middleware))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Response {
    let report = state.orchestrator.health_report();
    let status = if report.accepting_requests {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}

async fn not_found() -> ApiError {
    ApiError::RouteNotFound
}

/// Outermost layer: health exemption, drain tracking, data-plane forwarding.
pub async fn dispatch_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let class = classify(request.uri().path());
    if class == RequestClass::Health {
        return next.run(request).await;
    }

    let Some(_in_flight) = state.orchestrator.coordinator().track() else {
        return ApiError::ShuttingDown.into_response();
    };

    match class {
        RequestClass::DataPlane => match state.orchestrator.proxy().forward(request).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        },
        _ => next.run(request).await,
    }
}

/// Validate a presented delegation session before the handler runs.
pub async fn session_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(value) = request.headers().get(SESSION_HEADER) else {
        return next.run(request).await;
    };
    let Ok(raw) = value.to_str() else {
        return ApiError::MalformedSession.into_response();
    };

    let id = SessionId::from(raw);
    match state.orchestrator.delegation().validate(&id).await {
        Ok(()) => next.run(request).await,
        Err(e) => ApiError::from(e).into_response(),
    }
}
