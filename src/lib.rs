// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! Node Orchestrator
//!
//! A single-node control plane for a machine that can run one of three
//! resource-heavy workloads at a time: mining, training or inference.
//!
//! # Responsibilities
//!
//! - **Exclusivity**: at most one exclusive workload owns the node
//!   ([`gate::ExclusivityGate`]).
//! - **Supervision**: every workload sits behind [`managers::ManagerLifecycle`];
//!   a background [`watcher::Watcher`] reconciles crashes.
//! - **Proxying**: data-plane traffic is forwarded to whichever inference
//!   backend is bound, with a shim for legacy clients ([`proxy`]).
//! - **Delegation**: time-limited sessions opened with a shared token
//!   ([`delegation::DelegationManager`]).
//! - **Shutdown**: a fixed, best-effort teardown sequence
//!   ([`orchestrator::NodeOrchestrator::shutdown`]).

pub mod api;
pub mod cli;
pub mod config;
pub mod delegation;
pub mod gate;
pub mod health;
pub mod managers;
pub mod orchestrator;
pub mod proxy;
pub mod shutdown;
pub mod telemetry;
pub mod transition;
pub mod watcher;

pub use orchestrator::NodeOrchestrator;

/// Path prefix of the control-plane API.
pub const API_PREFIX: &str = "/api/v1";
