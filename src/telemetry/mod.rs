// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! Structured logging, lifecycle/audit events, and request spans.

pub mod events;
mod logging;
mod spans;

pub use events::{log_event, EventSeverity, OrchestratorEvent};
pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use spans::{ProxySpan, SpanExt};
