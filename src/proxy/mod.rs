// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! Proxy layer: classifies inbound requests and forwards data-plane
//! traffic to whichever serving backend is currently bound.

mod binding;
mod forward;
mod legacy;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub use binding::{BackendBinding, RouteTable};
pub use forward::{BackendProxy, ProxyStatus};
pub use legacy::{default_rules, LegacyShim, RewriteRule};

use crate::API_PREFIX;

/// Where a request is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Orchestration API, handled locally.
    ControlPlane,
    /// Liveness endpoint, exempt from every gate.
    Health,
    /// Anything else, forwarded to the serving backend.
    DataPlane,
}

pub const HEALTH_PATH: &str = "/health";

/// Classify a request path.
pub fn classify(path: &str) -> RequestClass {
    if path == HEALTH_PATH {
        return RequestClass::Health;
    }
    match path.strip_prefix(API_PREFIX) {
        Some("") => RequestClass::ControlPlane,
        Some(rest) if rest.starts_with('/') => RequestClass::ControlPlane,
        _ => RequestClass::DataPlane,
    }
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("No serving backend is bound")]
    BackendUnavailable,

    #[error("A backend binding needs at least one upstream")]
    EmptyBinding,

    #[error("Invalid upstream address {addr:?}: {reason}")]
    InvalidUpstream { addr: String, reason: String },

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Upstream did not respond within {0:?}")]
    Timeout(std::time::Duration),

    #[error("Failed to bind legacy listener: {0}")]
    Bind(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BackendUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::EmptyBinding | Self::InvalidUpstream { .. } => StatusCode::BAD_REQUEST,
            Self::Bind(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BackendUnavailable => "backend_unavailable",
            Self::EmptyBinding => "empty_binding",
            Self::InvalidUpstream { .. } => "invalid_upstream",
            Self::Upstream(_) => "upstream_error",
            Self::Timeout(_) => "upstream_timeout",
            Self::Bind(_) => "bind_failed",
        }
    }
}

#[derive(Serialize)]
struct ProxyErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = ProxyErrorBody { error: self.code(), message: self.to_string() };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify("/health"), RequestClass::Health);
        assert_eq!(classify("/api/v1"), RequestClass::ControlPlane);
        assert_eq!(classify("/api/v1/inference/start"), RequestClass::ControlPlane);
        assert_eq!(classify("/api/v1x"), RequestClass::DataPlane);
        assert_eq!(classify("/v1/completions"), RequestClass::DataPlane);
        assert_eq!(classify("/healthz"), RequestClass::DataPlane);
        assert_eq!(classify("/"), RequestClass::DataPlane);
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(ProxyError::BackendUnavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ProxyError::Upstream("refused".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ProxyError::Timeout(std::time::Duration::from_secs(1)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
