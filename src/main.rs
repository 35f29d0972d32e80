// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! Node orchestrator entry point.
//!
//! ## CLI Subcommands
//!
//! - `node-orchestrator` or `node-orchestrator serve` - Run the control plane (default)
//! - `node-orchestrator health [--addr A]` - Probe `/health` (exit 0/1/3)
//! - `node-orchestrator config show|validate` - Inspect configuration

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use node_orchestrator::api::{self, AppState};
use node_orchestrator::cli::{config_cmd, flag_value, probe_addr, run_health, EXIT_USAGE};
use node_orchestrator::config::{self, NodeConfig};
use node_orchestrator::shutdown::ShutdownResult;
use node_orchestrator::telemetry::init_logging;
use node_orchestrator::NodeOrchestrator;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("serve");

    match command {
        "serve" | "" => {
            let config = config::load();
            if let Err(e) = init_logging(&config.log) {
                eprintln!("Failed to initialise logging: {e}");
                return ExitCode::FAILURE;
            }
            match serve(config).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!(error = %e, "node orchestrator failed");
                    ExitCode::FAILURE
                }
            }
        }
        "health" => {
            let addr = match flag_value(&args, "--addr") {
                Some(raw) => match raw.parse::<SocketAddr>() {
                    Ok(addr) => addr,
                    Err(e) => {
                        eprintln!("Invalid --addr {raw:?}: {e}");
                        return ExitCode::from(EXIT_USAGE as u8);
                    }
                },
                None => probe_addr(config::load().bind_addr),
            };
            ExitCode::from(run_health(addr).await as u8)
        }
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => ExitCode::from(config_cmd::run_show() as u8),
                "validate" => ExitCode::from(config_cmd::run_validate() as u8),
                _ => {
                    eprintln!("Unknown config subcommand: {subcommand}");
                    print_usage();
                    ExitCode::from(EXIT_USAGE as u8)
                }
            }
        }
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("node-orchestrator {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {command}");
            print_usage();
            ExitCode::from(EXIT_USAGE as u8)
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "node-orchestrator v{version}

USAGE:
    node-orchestrator [COMMAND] [OPTIONS]

COMMANDS:
    serve            Run the control plane (default when no command given)
    health           Probe /health of a running node
    config show      Print the effective configuration as JSON
    config validate  Warn about suspicious configuration
    version          Show version information
    help             Show this help message

OPTIONS:
    --addr HOST:PORT  Address for `health` (default: NODE_BIND_ADDR)

ENVIRONMENT:
    NODE_BIND_ADDR            HTTP listen address (default: 0.0.0.0:8080)
    NODE_BACKEND_ADDRS        Inference backends, comma separated
    NODE_INFERENCE_CMD        Command line that starts the inference server
    NODE_MINING_CMD           Command line that starts the miner
    NODE_TRAINING_CMD         Command line that starts training
    DELEGATION_AUTH_TOKEN     Shared delegation secret (empty disables delegation)
    NODE_LOG_FORMAT           json or pretty
    RUST_LOG                  Log filter (default: info)

EXIT CODES:
    0  Success / Healthy
    1  Failure / Unhealthy
    2  Usage error
    3  Connection error
"
    );
}

async fn serve(config: NodeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = Arc::new(NodeOrchestrator::from_config(&config));
    orchestrator.boot().await?;

    let listener = match TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %config.bind_addr, error = %e, "failed to bind control plane");
            let report = orchestrator.shutdown().await;
            info!(clean = report.is_clean(), "teardown after bind failure complete");
            return Err(e.into());
        }
    };
    info!(addr = ?listener.local_addr().ok(), "control plane listening");

    let stop_serving = CancellationToken::new();
    let app = api::router(AppState::new(Arc::clone(&orchestrator)));
    let graceful = stop_serving.clone().cancelled_owned();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app).with_graceful_shutdown(graceful).await
    });

    let server_exited = tokio::select! {
        _ = shutdown_signal() => {
            info!("shutdown signal received, draining");
            false
        }
        result = &mut server => {
            match result {
                Ok(Ok(())) => warn!("HTTP server exited unexpectedly"),
                Ok(Err(e)) => error!(error = %e, "HTTP server failed"),
                Err(e) => error!(error = %e, "HTTP server task panicked"),
            }
            true
        }
    };

    match orchestrator.coordinator().initiate(config.shutdown_timeout).await {
        ShutdownResult::Complete => info!("in-flight requests drained"),
        ShutdownResult::Timeout { remaining } => {
            warn!(remaining, "drain timed out; continuing shutdown")
        }
    }

    stop_serving.cancel();
    if !server_exited {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "HTTP server error during shutdown"),
            Err(e) => warn!(error = %e, "HTTP server task failed during shutdown"),
        }
    }

    let report = orchestrator.shutdown().await;
    info!(
        clean = report.is_clean(),
        sessions_purged = report.sessions_purged,
        steps = report.steps.len(),
        "node orchestrator stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
