// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! Shared fixtures: an orchestrator wired to scriptable managers, and a
//! throwaway upstream HTTP server.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, Method, Uri};
use axum::Router;
use node_orchestrator::delegation::{DelegationConfig, DelegationManager};
use node_orchestrator::managers::{
    CountingSession, ExclusiveManagers, HardwareMonitor, Journal, ManagedKind, ManagerRegistry,
    MockManager, ModelCatalog,
};
use node_orchestrator::proxy::{default_rules, BackendProxy, LegacyShim};
use node_orchestrator::NodeOrchestrator;
use tokio::net::TcpListener;

pub const TOKEN: &str = "s3cret-delegation-token";

pub struct Fixture {
    pub orchestrator: Arc<NodeOrchestrator>,
    pub mining: Arc<MockManager>,
    pub training: Arc<MockManager>,
    pub inference: Arc<MockManager>,
    pub session: Arc<CountingSession>,
    pub journal: Journal,
}

pub struct FixtureBuilder {
    journal: Journal,
    mining: MockManager,
    training: MockManager,
    inference: MockManager,
    max_sessions: usize,
    watch_interval: Duration,
}

impl FixtureBuilder {
    pub fn new() -> Self {
        let journal = Journal::default();
        Self {
            mining: MockManager::new(ManagedKind::Mining).with_journal(journal.clone()),
            training: MockManager::new(ManagedKind::Training).with_journal(journal.clone()),
            inference: MockManager::new(ManagedKind::Inference).with_journal(journal.clone()),
            journal,
            max_sessions: 2,
            watch_interval: Duration::from_millis(10),
        }
    }

    pub fn mining(mut self, f: impl FnOnce(MockManager) -> MockManager) -> Self {
        self.mining = f(self.mining);
        self
    }

    pub fn training(mut self, f: impl FnOnce(MockManager) -> MockManager) -> Self {
        self.training = f(self.training);
        self
    }

    pub fn inference(mut self, f: impl FnOnce(MockManager) -> MockManager) -> Self {
        self.inference = f(self.inference);
        self
    }

    pub fn max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    pub fn watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    pub fn build(self) -> Fixture {
        let mining = Arc::new(self.mining);
        let training = Arc::new(self.training);
        let inference = Arc::new(self.inference);
        let session = Arc::new(CountingSession::new().with_journal(self.journal.clone()));

        let registry = ManagerRegistry::new(
            ExclusiveManagers {
                mining: mining.clone(),
                training: training.clone(),
                inference: inference.clone(),
            },
            Arc::new(ModelCatalog::new()),
            Arc::new(HardwareMonitor::new(session.clone())),
        );
        let proxy =
            BackendProxy::new(Duration::from_secs(5), LegacyShim::new(default_rules(), None));
        let delegation = DelegationManager::new(DelegationConfig {
            auth_token: TOKEN.to_string(),
            max_sessions: self.max_sessions,
            session_lifetime: Duration::from_secs(3600),
        });

        Fixture {
            orchestrator: Arc::new(NodeOrchestrator::new(
                registry,
                proxy,
                delegation,
                self.watch_interval,
            )),
            mining,
            training,
            inference,
            session,
            journal: self.journal,
        }
    }
}

/// Start an HTTP server that answers every request with
/// `"<method> <path?query> <x-request-id>"`.
pub async fn spawn_echo_upstream() -> SocketAddr {
    async fn echo(method: Method, uri: Uri, headers: HeaderMap) -> String {
        let request_id = headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();
        let target = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        format!("{method} {target} {request_id}")
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, Router::new().fallback(echo)).await.unwrap();
    });
    addr
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
