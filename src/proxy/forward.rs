// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! Data-plane forwarding to the bound serving backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, HOST};
use axum::http::{Uri, Version};
use axum::response::{IntoResponse, Response};
use axum::Router;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use super::binding::{BackendBinding, RouteTable};
use super::legacy::{LegacyShim, ListenerHandle};
use super::ProxyError;
use crate::telemetry::{log_event, OrchestratorEvent, ProxySpan, SpanExt};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Snapshot of the proxy for the control-plane API.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyStatus {
    pub established: bool,
    pub bound: bool,
    pub upstreams: Vec<String>,
    pub legacy_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy_listener: Option<String>,
}

pub struct BackendProxy {
    routes: RouteTable,
    established: AtomicBool,
    client: Client<HttpConnector, Body>,
    timeout: Duration,
    legacy: LegacyShim,
}

impl BackendProxy {
    pub fn new(timeout: Duration, legacy: LegacyShim) -> Self {
        Self {
            routes: RouteTable::new(),
            established: AtomicBool::new(false),
            client: Client::builder(TokioExecutor::new()).build_http(),
            timeout,
            legacy,
        }
    }

    /// Establish the proxy. Safe to call with no backend running yet.
    pub async fn start_backend_proxy(&self, initial: Option<BackendBinding>) -> Result<(), ProxyError> {
        self.established.store(true, Ordering::SeqCst);
        if let Some(binding) = initial {
            self.reconfigure(Some(binding));
        }
        info!(bound = self.routes.is_bound(), "backend proxy established");
        Ok(())
    }

    /// Tear the proxy down. Idempotent.
    pub async fn stop_backend_proxy(&self) -> Result<(), ProxyError> {
        let was_established = self.established.swap(false, Ordering::SeqCst);
        self.routes.swap(None);
        if was_established {
            info!("backend proxy torn down");
        }
        Ok(())
    }

    /// Swap the serving binding. Returns the previous one.
    pub fn reconfigure(&self, next: Option<BackendBinding>) -> Option<Arc<BackendBinding>> {
        let upstreams = next.as_ref().map(describe);
        let previous = self.routes.swap(next.map(Arc::new));
        match upstreams {
            Some(upstreams) => log_event(
                OrchestratorEvent::BackendBound,
                "serving backend bound",
                &[("upstreams", upstreams.as_str())],
            ),
            None if previous.is_some() => {
                log_event(OrchestratorEvent::BackendUnbound, "serving backend unbound", &[])
            }
            None => {}
        }
        previous
    }

    pub fn current_binding(&self) -> Option<Arc<BackendBinding>> {
        self.routes.current()
    }

    pub fn is_established(&self) -> bool {
        self.established.load(Ordering::SeqCst)
    }

    pub fn legacy(&self) -> &LegacyShim {
        &self.legacy
    }

    /// Enable the legacy shim, binding its listener if one is configured.
    ///
    /// A bind failure leaves the shim disabled and is returned to the caller.
    pub async fn start_legacy_compatibility(self: &Arc<Self>) -> Result<(), ProxyError> {
        let Some(addr) = self.legacy.bind_addr() else {
            if !self.legacy.set_enabled(true) {
                log_event(OrchestratorEvent::LegacyShimStarted, "legacy path rewriting enabled", &[]);
            }
            return Ok(());
        };
        if self.legacy.listener.lock().is_some() {
            self.legacy.set_enabled(true);
            return Ok(());
        }

        let listener = TcpListener::bind(addr).await.map_err(|e| {
            log_event(
                OrchestratorEvent::LegacyShimFailed,
                "legacy listener bind failed",
                &[("addr", addr.to_string().as_str()), ("error", e.to_string().as_str())],
            );
            ProxyError::Bind(format!("{addr}: {e}"))
        })?;
        let local_addr = listener.local_addr().map_err(|e| ProxyError::Bind(e.to_string()))?;

        let cancel = CancellationToken::new();
        let app = Router::new().fallback(legacy_fallback).with_state(Arc::clone(self));
        let shutdown = cancel.clone();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(shutdown.cancelled_owned());
            if let Err(e) = server.await {
                warn!(error = %e, "legacy listener exited with error");
            }
        });

        let mut slot = self.legacy.listener.lock();
        if slot.is_some() {
            // Another caller won the race; keep theirs.
            cancel.cancel();
        } else {
            *slot = Some(ListenerHandle { local_addr, cancel, task });
        }
        drop(slot);

        self.legacy.set_enabled(true);
        log_event(
            OrchestratorEvent::LegacyShimStarted,
            "legacy compatibility listener started",
            &[("addr", local_addr.to_string().as_str())],
        );
        Ok(())
    }

    /// Disable the legacy shim and stop its listener. Idempotent.
    pub async fn stop_legacy_compatibility(&self) -> Result<(), ProxyError> {
        let was_enabled = self.legacy.set_enabled(false);
        let handle = self.legacy.listener.lock().take();
        if let Some(handle) = handle {
            handle.cancel.cancel();
            if let Err(e) = handle.task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "legacy listener task failed");
                }
            }
        }
        if was_enabled {
            log_event(OrchestratorEvent::LegacyShimStopped, "legacy compatibility stopped", &[]);
        }
        Ok(())
    }

    pub fn status(&self) -> ProxyStatus {
        let binding = self.routes.current();
        ProxyStatus {
            established: self.is_established(),
            bound: binding.is_some(),
            upstreams: binding
                .map(|b| b.upstreams().iter().map(|a| a.to_string()).collect())
                .unwrap_or_default(),
            legacy_enabled: self.legacy.is_enabled(),
            legacy_listener: self.legacy.listener_addr().map(|a| a.to_string()),
        }
    }

    /// Forward a data-plane request to the current binding.
    pub async fn forward(&self, request: Request) -> Result<Response, ProxyError> {
        if !self.is_established() {
            metrics::counter!("node_proxy_requests_total", "outcome" => "unavailable").increment(1);
            return Err(ProxyError::BackendUnavailable);
        }
        let Some(binding) = self.routes.current() else {
            metrics::counter!("node_proxy_requests_total", "outcome" => "unavailable").increment(1);
            return Err(ProxyError::BackendUnavailable);
        };
        let upstream = binding.next_upstream().as_str().to_string();

        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let span = ProxySpan::new(&request_id, request.method().as_str(), request.uri().path());
        span.record("upstream", upstream.as_str());

        let started = Instant::now();
        let result = self.send(request, &upstream, &request_id).instrument(span.clone()).await;
        span.record("latency_ms", started.elapsed().as_millis() as u64);
        span.record_result(&result);

        let outcome = match &result {
            Ok(_) => "forwarded",
            Err(ProxyError::Timeout(_)) => "timeout",
            Err(_) => "upstream_error",
        };
        metrics::counter!("node_proxy_requests_total", "outcome" => outcome).increment(1);
        result
    }

    async fn send(&self, request: Request, upstream: &str, request_id: &str) -> Result<Response, ProxyError> {
        let (mut parts, body) = request.into_parts();

        let path_and_query = {
            let original = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
            match self.legacy.rewrite(original) {
                Some(rewritten) => {
                    debug!(from = original, to = %rewritten, "legacy path rewritten");
                    rewritten
                }
                None => original.to_string(),
            }
        };
        parts.uri = Uri::builder()
            .scheme("http")
            .authority(upstream)
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| ProxyError::InvalidUpstream { addr: upstream.to_string(), reason: e.to_string() })?;
        parts.version = Version::HTTP_11;
        strip_hop_by_hop(&mut parts.headers);
        parts.headers.remove(HOST);
        if let Ok(value) = HeaderValue::from_str(request_id) {
            parts.headers.insert(REQUEST_ID_HEADER, value);
        }

        let response = tokio::time::timeout(self.timeout, self.client.request(Request::from_parts(parts, body)))
            .await
            .map_err(|_| ProxyError::Timeout(self.timeout))?
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        if let Ok(value) = HeaderValue::from_str(request_id) {
            parts.headers.insert(REQUEST_ID_HEADER, value);
        }
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

fn describe(binding: &BackendBinding) -> String {
    binding.upstreams().iter().map(|a| a.as_str()).collect::<Vec<_>>().join(",")
}

/// Drop hop-by-hop headers, including any named by `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

async fn legacy_fallback(State(proxy): State<Arc<BackendProxy>>, request: Request) -> Response {
    match proxy.forward(request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::default_rules;

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive, x-private"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-private", HeaderValue::from_static("1"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        strip_hop_by_hop(&mut headers);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("content-type"));
    }

    #[tokio::test]
    async fn test_forward_before_established_is_unavailable() {
        let proxy = BackendProxy::new(Duration::from_secs(1), LegacyShim::new(default_rules(), None));
        let request = axum::http::Request::builder().uri("/v1/models").body(Body::empty()).unwrap();
        assert!(matches!(proxy.forward(request).await, Err(ProxyError::BackendUnavailable)));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let proxy = BackendProxy::new(Duration::from_secs(1), LegacyShim::new(default_rules(), None));
        proxy.stop_backend_proxy().await.unwrap();
        proxy.start_backend_proxy(None).await.unwrap();
        proxy.stop_backend_proxy().await.unwrap();
        proxy.stop_backend_proxy().await.unwrap();
        assert!(!proxy.status().established);
    }
}
