// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! Model catalog - tracks which models the node knows about.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{HealthSnapshot, ManagedKind, ManagerError, ManagerLifecycle, StartConfig};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Model already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Model not found: {0}")]
    NotFound(String),

    #[error("Invalid model id: {0:?}")]
    InvalidId(String),

    #[error("Model catalog is stopped")]
    Stopped,
}

/// A registered model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub registered_at: DateTime<Utc>,
}

/// Thread-safe catalog of models, supervised like any other manager.
pub struct ModelCatalog {
    models: RwLock<HashMap<String, ModelEntry>>,
    running: AtomicBool,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self { models: RwLock::new(HashMap::new()), running: AtomicBool::new(true) }
    }

    fn ensure_running(&self) -> Result<(), CatalogError> {
        if self.running.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CatalogError::Stopped)
        }
    }

    /// Register a model id (fails if already present).
    pub fn register(&self, id: &str, source: Option<String>) -> Result<ModelEntry, CatalogError> {
        self.ensure_running()?;
        let id = id.trim();
        if id.is_empty() || id.contains(char::is_whitespace) {
            return Err(CatalogError::InvalidId(id.to_string()));
        }

        let mut models = self.models.write();
        if models.contains_key(id) {
            return Err(CatalogError::AlreadyRegistered(id.to_string()));
        }
        let entry = ModelEntry { id: id.to_string(), source, registered_at: Utc::now() };
        models.insert(entry.id.clone(), entry.clone());
        Ok(entry)
    }

    pub fn get(&self, id: &str) -> Result<ModelEntry, CatalogError> {
        self.ensure_running()?;
        self.models.read().get(id).cloned().ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    /// All entries, ordered by id.
    pub fn list(&self) -> Result<Vec<ModelEntry>, CatalogError> {
        self.ensure_running()?;
        let mut entries: Vec<ModelEntry> = self.models.read().values().cloned().collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entries)
    }

    pub fn remove(&self, id: &str) -> Result<ModelEntry, CatalogError> {
        self.ensure_running()?;
        self.models.write().remove(id).ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    pub fn count(&self) -> usize {
        self.models.read().len()
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ManagerLifecycle for ModelCatalog {
    fn kind(&self) -> ManagedKind {
        ManagedKind::ModelRegistry
    }

    async fn start(&self, _config: StartConfig) -> Result<(), ManagerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ManagerError::AlreadyRunning(ManagedKind::ModelRegistry));
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), ManagerError> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn health(&self) -> HealthSnapshot {
        if !self.is_running() {
            return HealthSnapshot::stopped(ManagedKind::ModelRegistry);
        }
        HealthSnapshot::running(ManagedKind::ModelRegistry)
            .with_detail(format!("{} model(s) registered", self.count()))
    }
}
