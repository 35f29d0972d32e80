// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! Delegated-access sessions.
//!
//! SECURITY: a caller holding the shared delegation token may open a
//! bounded number of time-limited sessions. Each session id is 256 bits
//! from the OS CSPRNG; ids are never derived from time or counters.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::telemetry::{log_event, OrchestratorEvent};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DelegationError {
    #[error("Invalid delegation token")]
    Unauthorized,

    #[error("Delegation session limit reached ({max})")]
    CapacityExceeded { max: usize },

    #[error("Session not found")]
    SessionNotFound,

    #[error("Session expired")]
    SessionExpired,
}

/// Opaque session identifier (64 hex chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix safe to log.
    pub fn prefix(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.trim().to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct DelegationConfig {
    /// Shared secret. Empty disables delegation entirely.
    pub auth_token: String,
    pub max_sessions: usize,
    pub session_lifetime: Duration,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            auth_token: String::new(),
            max_sessions: 10,
            session_lifetime: Duration::from_secs(3600),
        }
    }
}

struct Session {
    created_at: Instant,
    created_wall: DateTime<Utc>,
    requested_by: String,
}

/// Reportable view of a session. Never carries the full id.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id_prefix: String,
    pub requested_by: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub struct DelegationManager {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
    expected_token_hash: Option<[u8; 32]>,
    max_sessions: usize,
    session_lifetime: Duration,
}

impl DelegationManager {
    pub fn new(config: DelegationConfig) -> Self {
        let expected_token_hash =
            (!config.auth_token.is_empty()).then(|| hash_token(&config.auth_token));
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            expected_token_hash,
            max_sessions: config.max_sessions,
            session_lifetime: config.session_lifetime,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.expected_token_hash.is_some()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    pub fn session_lifetime(&self) -> Duration {
        self.session_lifetime
    }

    /// Open a session for `requested_by` if the presented token matches.
    pub async fn create_session(
        &self,
        presented_token: &str,
        requested_by: &str,
    ) -> Result<SessionId, DelegationError> {
        let authorized = match &self.expected_token_hash {
            Some(expected) => constant_time_compare(&hash_token(presented_token), expected),
            None => false,
        };
        if !authorized {
            log_event(
                OrchestratorEvent::DelegationUnauthorized,
                "delegation token rejected",
                &[("requested_by", requested_by)],
            );
            return Err(DelegationError::Unauthorized);
        }

        let mut sessions = self.sessions.write().await;
        let lifetime = self.session_lifetime;
        sessions.retain(|_, s| s.created_at.elapsed() <= lifetime);

        if sessions.len() >= self.max_sessions {
            log_event(
                OrchestratorEvent::DelegationCapacityExceeded,
                "delegation session limit reached",
                &[("requested_by", requested_by), ("max", self.max_sessions.to_string().as_str())],
            );
            return Err(DelegationError::CapacityExceeded { max: self.max_sessions });
        }

        let id = generate_session_id();
        sessions.insert(
            id.clone(),
            Session {
                created_at: Instant::now(),
                created_wall: Utc::now(),
                requested_by: requested_by.to_string(),
            },
        );
        let active = sessions.len();
        drop(sessions);

        metrics::counter!("node_delegation_sessions_created_total").increment(1);
        log_event(
            OrchestratorEvent::SessionCreated,
            "delegation session created",
            &[
                ("session", id.prefix()),
                ("requested_by", requested_by),
                ("active", active.to_string().as_str()),
            ],
        );
        Ok(id)
    }

    /// Check a session is live. Expired sessions are removed.
    pub async fn validate(&self, id: &SessionId) -> Result<(), DelegationError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get(id).ok_or_else(|| {
            log_event(
                OrchestratorEvent::InvalidSession,
                "unknown delegation session",
                &[("session", id.prefix())],
            );
            DelegationError::SessionNotFound
        })?;

        if session.created_at.elapsed() > self.session_lifetime {
            sessions.remove(id);
            log_event(
                OrchestratorEvent::SessionExpired,
                "delegation session expired",
                &[("session", id.prefix())],
            );
            return Err(DelegationError::SessionExpired);
        }
        Ok(())
    }

    /// Remove a session. Unknown ids are ignored.
    pub async fn revoke(&self, id: &SessionId) -> Result<(), DelegationError> {
        if self.sessions.write().await.remove(id).is_some() {
            log_event(
                OrchestratorEvent::SessionRevoked,
                "delegation session revoked",
                &[("session", id.prefix())],
            );
        }
        Ok(())
    }

    /// Purge every session. Returns how many were dropped.
    pub async fn stop(&self) -> usize {
        let purged = {
            let mut sessions = self.sessions.write().await;
            let n = sessions.len();
            sessions.clear();
            n
        };
        log_event(
            OrchestratorEvent::SessionsPurged,
            "delegation sessions purged",
            &[("count", purged.to_string().as_str())],
        );
        purged
    }

    /// Drop expired sessions. Returns how many were removed.
    pub async fn cleanup(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        let lifetime = self.session_lifetime;
        sessions.retain(|_, s| s.created_at.elapsed() <= lifetime);
        before - sessions.len()
    }

    /// Non-expired sessions.
    pub async fn active_count(&self) -> usize {
        let lifetime = self.session_lifetime;
        self.sessions.read().await.values().filter(|s| s.created_at.elapsed() <= lifetime).count()
    }

    pub async fn list(&self) -> Vec<SessionInfo> {
        let lifetime = self.session_lifetime;
        let ttl = chrono::Duration::from_std(lifetime).unwrap_or_else(|_| chrono::Duration::days(36_500));
        let sessions = self.sessions.read().await;
        let mut out: Vec<SessionInfo> = sessions
            .iter()
            .filter(|(_, s)| s.created_at.elapsed() <= lifetime)
            .map(|(id, s)| SessionInfo {
                id_prefix: id.prefix().to_string(),
                requested_by: s.requested_by.clone(),
                created_at: s.created_wall,
                expires_at: s.created_wall.checked_add_signed(ttl).unwrap_or(s.created_wall),
            })
            .collect();
        out.sort_by_key(|info| info.created_at);
        out
    }
}

fn hash_token(token: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

/// Constant-time comparison to prevent timing attacks.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn generate_session_id() -> SessionId {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    SessionId(hex::encode(bytes))
}
