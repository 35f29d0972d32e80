// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::delegation::DelegationError;
use crate::gate::GateError;
use crate::managers::{CatalogError, ManagerError, TelemetryError, UnknownWorkload};
use crate::orchestrator::OrchestratorError;
use crate::proxy::ProxyError;

/// Every error a handler can return, with its HTTP mapping.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    Delegation(#[from] DelegationError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error(transparent)]
    UnknownWorkload(#[from] UnknownWorkload),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Malformed delegation session header")]
    MalformedSession,

    #[error("No such route")]
    RouteNotFound,

    #[error("Node is shutting down")]
    ShuttingDown,
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Orchestrator(OrchestratorError::Gate(GateError::Conflict { .. })) => {
                StatusCode::CONFLICT
            }
            Self::Orchestrator(OrchestratorError::Manager(e)) => match e {
                ManagerError::AlreadyRunning(_) => StatusCode::CONFLICT,
                ManagerError::StartFailure { .. } | ManagerError::StopFailure { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Orchestrator(OrchestratorError::Proxy(e)) | Self::Proxy(e) => e.status(),
            Self::Delegation(DelegationError::CapacityExceeded { .. }) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            Self::Delegation(_) | Self::MalformedSession => StatusCode::UNAUTHORIZED,
            Self::Catalog(e) => match e {
                CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
                CatalogError::AlreadyRegistered(_) => StatusCode::CONFLICT,
                CatalogError::InvalidId(_) => StatusCode::BAD_REQUEST,
                CatalogError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
            },
            Self::Telemetry(TelemetryError::Released) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Telemetry(TelemetryError::Session(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UnknownWorkload(_) | Self::RouteNotFound => StatusCode::NOT_FOUND,
            Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Orchestrator(OrchestratorError::Gate(_)) => "conflict",
            Self::Orchestrator(OrchestratorError::Manager(e)) => match e {
                ManagerError::AlreadyRunning(_) => "already_running",
                ManagerError::StartFailure { .. } => "start_failure",
                ManagerError::StopFailure { .. } => "stop_failure",
            },
            Self::Orchestrator(OrchestratorError::Proxy(e)) | Self::Proxy(e) => e.code(),
            Self::Delegation(e) => match e {
                DelegationError::Unauthorized => "unauthorized",
                DelegationError::CapacityExceeded { .. } => "capacity_exceeded",
                DelegationError::SessionNotFound => "session_not_found",
                DelegationError::SessionExpired => "session_expired",
            },
            Self::Catalog(e) => match e {
                CatalogError::NotFound(_) => "model_not_found",
                CatalogError::AlreadyRegistered(_) => "model_already_registered",
                CatalogError::InvalidId(_) => "invalid_model_id",
                CatalogError::Stopped => "catalog_stopped",
            },
            Self::Telemetry(_) => "telemetry_unavailable",
            Self::UnknownWorkload(_) => "unknown_workload",
            Self::InvalidBody(_) => "invalid_body",
            Self::MalformedSession => "session_not_found",
            Self::RouteNotFound => "not_found",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        }
        let body = ErrorBody { error: self.code(), message: self.to_string() };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::{ManagedKind, WorkloadKind};

    #[test]
    fn test_status_mapping() {
        let conflict = ApiError::from(OrchestratorError::from(GateError::Conflict {
            current: WorkloadKind::Mining,
            requested: WorkloadKind::Inference,
        }));
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
        assert_eq!(conflict.code(), "conflict");

        let failed = ApiError::from(OrchestratorError::from(ManagerError::start_failure(
            ManagedKind::Training,
            "exit 1",
        )));
        assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(
            ApiError::from(DelegationError::CapacityExceeded { max: 2 }).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(ApiError::from(DelegationError::SessionExpired).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::from(UnknownWorkload("gaming".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(CatalogError::NotFound("llama".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ApiError::ShuttingDown.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
