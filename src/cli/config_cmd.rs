// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! Config CLI subcommands: show, validate.
//!
//! These read configuration directly from environment variables and never
//! contact a running node.

use crate::config::{self, EffectiveConfig, NodeConfig};
use crate::managers::ProcessSpec;

/// Print the effective config as JSON. The delegation token is redacted.
pub fn run_show() -> i32 {
    let cfg = config::load().effective_config();
    match render(&cfg) {
        Ok(json) => {
            println!("{json}");
            0
        }
        Err(e) => {
            eprintln!("Failed to render configuration: {e}");
            1
        }
    }
}

fn render(cfg: &EffectiveConfig) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(cfg)
}

/// Check for obvious misconfigurations. Returns 0 if valid, 1 on warnings.
pub fn run_validate() -> i32 {
    let warnings = validate(&config::load());
    for warning in &warnings {
        eprintln!("WARNING: {warning}");
    }
    if warnings.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

fn validate(cfg: &NodeConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    for (name, command) in [
        ("NODE_MINING_CMD", &cfg.commands.mining),
        ("NODE_TRAINING_CMD", &cfg.commands.training),
        ("NODE_INFERENCE_CMD", &cfg.commands.inference),
    ] {
        match command {
            None => warnings.push(format!("{name} is unset; starts of that workload will fail")),
            Some(line) if ProcessSpec::from_command_line(line).is_none() => {
                warnings.push(format!("{name} has no program"))
            }
            Some(_) => {}
        }
    }

    if cfg.legacy_bind_addr == Some(cfg.bind_addr) {
        warnings.push("NODE_LEGACY_BIND_ADDR equals NODE_BIND_ADDR".to_string());
    }
    if !cfg.delegation.auth_token.is_empty() && cfg.delegation.max_sessions == 0 {
        warnings.push("DELEGATION_MAX_SESSIONS is 0; every session request will be refused".to_string());
    }
    if cfg.watch_interval >= cfg.shutdown_timeout {
        warnings.push(
            "NODE_WATCH_INTERVAL_SECS >= NODE_SHUTDOWN_TIMEOUT_SECS; crash detection lags the drain"
                .to_string(),
        );
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkloadCommands;

    fn configured() -> NodeConfig {
        NodeConfig {
            commands: WorkloadCommands {
                mining: Some("xmrig --threads 4".into()),
                training: Some("python train.py".into()),
                inference: Some("llama-server --port 5000".into()),
            },
            ..NodeConfig::default()
        }
    }

    #[test]
    fn test_fully_configured_node_validates() {
        assert!(validate(&configured()).is_empty());
    }

    #[test]
    fn test_missing_commands_warn() {
        let warnings = validate(&NodeConfig::default());
        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].contains("NODE_MINING_CMD"));
    }

    #[test]
    fn test_same_legacy_and_main_addr_warns() {
        let mut cfg = configured();
        cfg.legacy_bind_addr = Some(cfg.bind_addr);
        assert_eq!(validate(&cfg).len(), 1);
    }

    #[test]
    fn test_zero_session_cap_warns_only_when_enabled() {
        let mut cfg = configured();
        cfg.delegation.max_sessions = 0;
        assert!(validate(&cfg).is_empty());
        cfg.delegation.auth_token = "hunter2".into();
        assert_eq!(validate(&cfg).len(), 1);
    }

    #[test]
    fn test_show_redacts_token() {
        let mut cfg = configured();
        cfg.delegation.auth_token = "hunter2".into();
        let json = render(&cfg.effective_config()).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(json.contains("<redacted>"));
    }
}
