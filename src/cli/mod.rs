// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! CLI subcommands that run without starting the orchestrator.
//!
//! ## Usage
//!
//! ```bash
//! node-orchestrator health                 # Probe /health, exits 0 when serving
//! node-orchestrator health --addr H:P      # Probe a specific address
//! node-orchestrator config show            # Print the effective configuration
//! node-orchestrator config validate        # Warn about suspicious settings
//! ```

pub mod config_cmd;
pub mod health;

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

pub use health::{run_health, HealthProbeError};

/// Process exit codes shared by the probe commands.
pub const EXIT_HEALTHY: i32 = 0;
pub const EXIT_UNHEALTHY: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_CONNECTION: i32 = 3;

/// Address the probe should dial for a server bound to `bind`.
///
/// A wildcard bind address is replaced with loopback on the same port.
pub fn probe_addr(bind: SocketAddr) -> SocketAddr {
    match bind {
        SocketAddr::V4(v4) if v4.ip().is_unspecified() => {
            SocketAddr::from((Ipv4Addr::LOCALHOST, v4.port()))
        }
        SocketAddr::V6(v6) if v6.ip().is_unspecified() => {
            SocketAddr::from((Ipv6Addr::LOCALHOST, v6.port()))
        }
        other => other,
    }
}

/// Value following `flag` in `args`, if any.
pub fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter().position(|a| a == flag).and_then(|i| args.get(i + 1)).map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_addr_replaces_wildcard() {
        let bind: SocketAddr = "0.0.0.0:8080".parse().unwrap();
        assert_eq!(probe_addr(bind).to_string(), "127.0.0.1:8080");

        let bind: SocketAddr = "[::]:9000".parse().unwrap();
        assert_eq!(probe_addr(bind).to_string(), "[::1]:9000");

        let bind: SocketAddr = "10.0.0.5:8080".parse().unwrap();
        assert_eq!(probe_addr(bind), bind);
    }

    #[test]
    fn test_flag_value() {
        let args: Vec<String> =
            ["node-orchestrator", "health", "--addr", "127.0.0.1:9"].iter().map(|s| s.to_string()).collect();
        assert_eq!(flag_value(&args, "--addr"), Some("127.0.0.1:9"));
        assert_eq!(flag_value(&args, "--timeout"), None);

        let dangling: Vec<String> = vec!["health".into(), "--addr".into()];
        assert_eq!(flag_value(&dangling, "--addr"), None);
    }
}
