// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! Legacy-compatibility shim.
//!
//! Older clients call the serving backend without the `/v1` prefix. While
//! the shim is enabled those paths are rewritten before forwarding, and an
//! optional extra listener accepts traffic on the old serving port.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Maps one legacy path prefix onto its current equivalent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRule {
    legacy_prefix: String,
    current_prefix: String,
}

impl RewriteRule {
    pub fn new(legacy_prefix: impl Into<String>, current_prefix: impl Into<String>) -> Self {
        Self { legacy_prefix: legacy_prefix.into(), current_prefix: current_prefix.into() }
    }

    /// Rewrite `path_and_query` if its path matches the legacy prefix on a
    /// segment boundary. The query string is carried over untouched.
    pub fn apply(&self, path_and_query: &str) -> Option<String> {
        let (path, query) = match path_and_query.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path_and_query, None),
        };
        let rest = path.strip_prefix(self.legacy_prefix.as_str())?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return None;
        }
        let mut out = format!("{}{rest}", self.current_prefix);
        if let Some(q) = query {
            out.push('?');
            out.push_str(q);
        }
        Some(out)
    }
}

/// Rules for clients built against the unversioned serving API.
pub fn default_rules() -> Vec<RewriteRule> {
    ["/completions", "/chat/completions", "/models", "/embeddings", "/tokenize", "/detokenize"]
        .into_iter()
        .map(|p| RewriteRule::new(p, format!("/v1{p}")))
        .collect()
}

pub(super) struct ListenerHandle {
    pub(super) local_addr: SocketAddr,
    pub(super) cancel: CancellationToken,
    pub(super) task: JoinHandle<()>,
}

/// Rewrite rules plus the enabled flag and optional listener.
pub struct LegacyShim {
    rules: Vec<RewriteRule>,
    enabled: AtomicBool,
    bind_addr: Option<SocketAddr>,
    pub(super) listener: Mutex<Option<ListenerHandle>>,
}

impl LegacyShim {
    pub fn new(rules: Vec<RewriteRule>, bind_addr: Option<SocketAddr>) -> Self {
        Self { rules, enabled: AtomicBool::new(false), bind_addr, listener: Mutex::new(None) }
    }

    /// Rewrite a path if the shim is enabled and a rule matches.
    pub fn rewrite(&self, path_and_query: &str) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }
        self.rules.iter().find_map(|rule| rule.apply(path_and_query))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Returns the previous value.
    pub(super) fn set_enabled(&self, enabled: bool) -> bool {
        self.enabled.swap(enabled, Ordering::SeqCst)
    }

    pub fn bind_addr(&self) -> Option<SocketAddr> {
        self.bind_addr
    }

    /// Address the legacy listener is actually bound to, if running.
    pub fn listener_addr(&self) -> Option<SocketAddr> {
        self.listener.lock().as_ref().map(|l| l.local_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_matches_segment_boundary() {
        let rule = RewriteRule::new("/completions", "/v1/completions");
        assert_eq!(rule.apply("/completions"), Some("/v1/completions".into()));
        assert_eq!(rule.apply("/completions/abc"), Some("/v1/completions/abc".into()));
        assert_eq!(rule.apply("/completions?stream=true"), Some("/v1/completions?stream=true".into()));
        assert_eq!(rule.apply("/completionsx"), None);
        assert_eq!(rule.apply("/v1/completions"), None);
    }

    #[test]
    fn test_shim_only_rewrites_when_enabled() {
        let shim = LegacyShim::new(default_rules(), None);
        assert_eq!(shim.rewrite("/chat/completions"), None);

        shim.set_enabled(true);
        assert_eq!(shim.rewrite("/chat/completions"), Some("/v1/chat/completions".into()));
        assert_eq!(shim.rewrite("/models"), Some("/v1/models".into()));
        assert_eq!(shim.rewrite("/v1/models"), None);
    }
}
