// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! Runtime configuration loading from environment variables.
//!
//! Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `DELEGATION_AUTH_TOKEN` | empty (disabled) | Shared delegation secret |
//! | `DELEGATION_MAX_SESSIONS` | 10 | Max concurrent delegation sessions |
//! | `NODE_DELEGATION_SESSION_TTL_SECS` | 3600 | Delegation session lifetime |
//! | `NODE_BIND_ADDR` | 0.0.0.0:8080 | HTTP listen address |
//! | `NODE_LEGACY_COMPAT` | true | Enable the legacy shim at boot |
//! | `NODE_LEGACY_BIND_ADDR` | unset | Extra listener for legacy clients |
//! | `NODE_BACKEND_ADDRS` | 127.0.0.1:5000 | Inference backends, comma separated |
//! | `NODE_WATCH_INTERVAL_SECS` | 2 | Watcher poll interval |
//! | `NODE_SHUTDOWN_TIMEOUT_SECS` | 30 | Request drain timeout |
//! | `NODE_PROXY_TIMEOUT_SECS` | 300 | Upstream response timeout |
//! | `NODE_{MINING,TRAINING,INFERENCE}_CMD` | unset | Workload command line |
//! | `NODE_{MINING,TRAINING,INFERENCE}_STOP_MODE` | blocking / blocking / nonblocking | Stop path |
//! | `NODE_LOG_FORMAT` | json | `json` or `pretty` |
//! | `NODE_LOG_FILE` | unset | Log to this file instead of stderr |
//! | `RUST_LOG` | info | Log filter |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::delegation::DelegationConfig;
use crate::managers::{StopMode, StopModes};
use crate::telemetry::{LogConfig, LogFormat};

const DEFAULT_BIND: SocketAddr = SocketAddr::V4(std::net::SocketAddrV4::new(
    std::net::Ipv4Addr::UNSPECIFIED,
    8080,
));

/// Command lines for the exclusive workloads.
#[derive(Debug, Clone, Default)]
pub struct WorkloadCommands {
    pub mining: Option<String>,
    pub training: Option<String>,
    pub inference: Option<String>,
}

/// All runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_addr: SocketAddr,
    pub legacy_compat: bool,
    pub legacy_bind_addr: Option<SocketAddr>,
    pub backend_addrs: Vec<String>,
    pub watch_interval: Duration,
    pub shutdown_timeout: Duration,
    pub proxy_timeout: Duration,
    pub delegation: DelegationConfig,
    pub commands: WorkloadCommands,
    pub stop_modes: StopModes,
    pub log: LogConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND,
            legacy_compat: true,
            legacy_bind_addr: None,
            backend_addrs: vec!["127.0.0.1:5000".to_string()],
            watch_interval: Duration::from_secs(2),
            shutdown_timeout: Duration::from_secs(30),
            proxy_timeout: Duration::from_secs(300),
            delegation: DelegationConfig::default(),
            commands: WorkloadCommands::default(),
            stop_modes: StopModes::default(),
            log: LogConfig::default(),
        }
    }
}

/// Serializable summary of the effective values. Secrets are redacted.
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub bind_addr: String,
    pub legacy_compat: bool,
    pub legacy_bind_addr: Option<String>,
    pub backend_addrs: Vec<String>,
    pub watch_interval_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub proxy_timeout_secs: u64,
    pub delegation_enabled: bool,
    pub delegation_auth_token: &'static str,
    pub delegation_max_sessions: usize,
    pub delegation_session_ttl_secs: u64,
    pub mining_cmd: Option<String>,
    pub training_cmd: Option<String>,
    pub inference_cmd: Option<String>,
    pub stop_modes: StopModes,
    pub log_format: LogFormat,
    pub log_level: String,
    pub log_file: Option<String>,
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Parse an env var with `FromStr`, returning `default` on missing or invalid.
fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    var(key).and_then(|v| v.parse::<T>().ok()).unwrap_or(default)
}

fn parse_bool(key: &str, default: bool) -> bool {
    match var(key).map(|v| v.to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

/// Seconds, with a floor of one.
fn parse_secs(key: &str, default: u64) -> Duration {
    Duration::from_secs(parse_or(key, default).max(1))
}

fn load_delegation() -> DelegationConfig {
    DelegationConfig {
        auth_token: std::env::var("DELEGATION_AUTH_TOKEN").unwrap_or_default(),
        // Zero is honoured: every session request is refused.
        max_sessions: parse_or("DELEGATION_MAX_SESSIONS", 10),
        session_lifetime: parse_secs("NODE_DELEGATION_SESSION_TTL_SECS", 3600),
    }
}

fn load_stop_modes() -> StopModes {
    let defaults = StopModes::default();
    StopModes {
        mining: parse_or::<StopMode>("NODE_MINING_STOP_MODE", defaults.mining),
        training: parse_or::<StopMode>("NODE_TRAINING_STOP_MODE", defaults.training),
        inference: parse_or::<StopMode>("NODE_INFERENCE_STOP_MODE", defaults.inference),
    }
}

fn load_backends() -> Vec<String> {
    let addrs: Vec<String> = var("NODE_BACKEND_ADDRS")
        .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default();
    if addrs.is_empty() {
        NodeConfig::default().backend_addrs
    } else {
        addrs
    }
}

fn load_log() -> LogConfig {
    LogConfig {
        format: parse_or("NODE_LOG_FORMAT", LogFormat::Json),
        level: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        output_path: var("NODE_LOG_FILE").map(PathBuf::from),
    }
}

/// Load all configuration from environment variables.
pub fn load() -> NodeConfig {
    NodeConfig {
        bind_addr: parse_or("NODE_BIND_ADDR", DEFAULT_BIND),
        legacy_compat: parse_bool("NODE_LEGACY_COMPAT", true),
        legacy_bind_addr: var("NODE_LEGACY_BIND_ADDR").and_then(|v| v.parse().ok()),
        backend_addrs: load_backends(),
        watch_interval: parse_secs("NODE_WATCH_INTERVAL_SECS", 2),
        shutdown_timeout: parse_secs("NODE_SHUTDOWN_TIMEOUT_SECS", 30),
        proxy_timeout: parse_secs("NODE_PROXY_TIMEOUT_SECS", 300),
        delegation: load_delegation(),
        commands: WorkloadCommands {
            mining: var("NODE_MINING_CMD"),
            training: var("NODE_TRAINING_CMD"),
            inference: var("NODE_INFERENCE_CMD"),
        },
        stop_modes: load_stop_modes(),
        log: load_log(),
    }
}

impl NodeConfig {
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            bind_addr: self.bind_addr.to_string(),
            legacy_compat: self.legacy_compat,
            legacy_bind_addr: self.legacy_bind_addr.map(|a| a.to_string()),
            backend_addrs: self.backend_addrs.clone(),
            watch_interval_secs: self.watch_interval.as_secs(),
            shutdown_timeout_secs: self.shutdown_timeout.as_secs(),
            proxy_timeout_secs: self.proxy_timeout.as_secs(),
            delegation_enabled: !self.delegation.auth_token.is_empty(),
            delegation_auth_token: if self.delegation.auth_token.is_empty() { "" } else { "<redacted>" },
            delegation_max_sessions: self.delegation.max_sessions,
            delegation_session_ttl_secs: self.delegation.session_lifetime.as_secs(),
            mining_cmd: self.commands.mining.clone(),
            training_cmd: self.commands.training.clone(),
            inference_cmd: self.commands.inference.clone(),
            stop_modes: self.stop_modes,
            log_format: self.log.format,
            log_level: self.log.level.clone(),
            log_file: self.log.output_path.as_ref().map(|p| p.display().to_string()),
        }
    }
}
