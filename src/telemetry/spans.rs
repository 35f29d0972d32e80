// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! Span helpers for proxied requests.

use tracing::{info_span, Span};

/// Extension trait for recording outcomes onto a span.
pub trait SpanExt {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for data-plane request spans.
pub struct ProxySpan;

impl ProxySpan {
    /// Fields filled in later: `upstream`, `status`, `error.message`, `latency_ms`.
    pub fn new(request_id: &str, method: &str, path: &str) -> Span {
        info_span!(
            "proxy_request",
            request_id = %request_id,
            method = %method,
            path = %path,
            upstream = tracing::field::Empty,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    }
}
