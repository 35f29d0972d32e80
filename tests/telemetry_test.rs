//! Logging initialization and audit events.

use node_orchestrator::telemetry::{
    init_logging, log_event, EventSeverity, LogConfig, LogError, LogFormat, OrchestratorEvent,
};

#[test]
fn test_log_config_defaults() {
    let config = LogConfig::default();
    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.level, "info");
    assert!(config.output_path.is_none());
}

#[test]
fn test_event_severities() {
    assert_eq!(OrchestratorEvent::WorkloadStarted.severity(), EventSeverity::Info);
    assert_eq!(OrchestratorEvent::ReservationConflict.severity(), EventSeverity::Debug);
    assert_eq!(OrchestratorEvent::DelegationUnauthorized.severity(), EventSeverity::Warning);
    assert_eq!(OrchestratorEvent::SessionsPurged.as_str(), "sessions_purged");
}

// The global subscriber can be installed once per process, so the file
// sink and the double-init error are checked in one test.
#[test]
fn test_json_log_file_receives_events() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("node.log");
    let config = LogConfig {
        format: LogFormat::Json,
        level: "info".to_string(),
        output_path: Some(path.clone()),
    };
    init_logging(&config).unwrap();

    log_event(OrchestratorEvent::WorkloadStarted, "workload started", &[("workload", "mining")]);
    log_event(OrchestratorEvent::ReservationConflict, "filtered out at info", &[]);

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> =
        contents.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
    assert_eq!(lines.len(), 1, "{contents}");
    assert_eq!(lines[0]["level"], "INFO");
    assert_eq!(lines[0]["fields"]["event"], "workload_started");
    assert_eq!(lines[0]["fields"]["details"], "workload=mining");

    assert!(matches!(init_logging(&LogConfig::default()), Err(LogError::AlreadyInitialized)));
}
