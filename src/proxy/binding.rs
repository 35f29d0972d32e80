// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! Backend bindings and the swappable route table.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::uri::Authority;
use parking_lot::RwLock;

use super::ProxyError;

/// A non-empty set of upstream endpoints, picked round robin.
pub struct BackendBinding {
    upstreams: Vec<Authority>,
    cursor: AtomicUsize,
}

impl BackendBinding {
    /// Build from `host:port` strings. An `http://` prefix is tolerated.
    pub fn new<I, S>(endpoints: I) -> Result<Self, ProxyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let upstreams = endpoints
            .into_iter()
            .map(|e| parse_authority(e.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        if upstreams.is_empty() {
            return Err(ProxyError::EmptyBinding);
        }
        Ok(Self { upstreams, cursor: AtomicUsize::new(0) })
    }

    /// Next upstream in rotation.
    pub fn next_upstream(&self) -> &Authority {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed) % self.upstreams.len();
        &self.upstreams[i]
    }

    pub fn upstreams(&self) -> &[Authority] {
        &self.upstreams
    }
}

impl fmt::Debug for BackendBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendBinding").field("upstreams", &self.upstreams).finish()
    }
}

fn parse_authority(raw: &str) -> Result<Authority, ProxyError> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix("http://").unwrap_or(trimmed).trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ProxyError::InvalidUpstream { addr: raw.to_string(), reason: "empty".into() });
    }
    trimmed
        .parse::<Authority>()
        .map_err(|e| ProxyError::InvalidUpstream { addr: raw.to_string(), reason: e.to_string() })
}

/// The proxy's single serving slot.
///
/// Readers clone the `Arc` and release the lock immediately, so a swap
/// never waits on in-flight requests and they finish against the binding
/// they started with.
#[derive(Default)]
pub struct RouteTable {
    current: RwLock<Option<Arc<BackendBinding>>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the binding, returning the previous one.
    pub fn swap(&self, next: Option<Arc<BackendBinding>>) -> Option<Arc<BackendBinding>> {
        std::mem::replace(&mut *self.current.write(), next)
    }

    pub fn current(&self) -> Option<Arc<BackendBinding>> {
        self.current.read().clone()
    }

    pub fn is_bound(&self) -> bool {
        self.current.read().is_some()
    }
}
