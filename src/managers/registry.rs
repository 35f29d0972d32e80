// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! Manager registry - owns one instance of every manager for the process lifetime.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::{
    DetachedSession, HardwareMonitor, HealthSnapshot, ManagedKind, ManagerError, ManagerLifecycle,
    ModelCatalog, ProcessManager, ProcessSpec, StopMode, WorkloadKind,
};
use crate::config::NodeConfig;

/// The three exclusive workload managers.
#[derive(Clone)]
pub struct ExclusiveManagers {
    pub mining: Arc<dyn ManagerLifecycle>,
    pub training: Arc<dyn ManagerLifecycle>,
    pub inference: Arc<dyn ManagerLifecycle>,
}

/// Per-workload stop path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StopModes {
    pub mining: StopMode,
    pub training: StopMode,
    pub inference: StopMode,
}

impl Default for StopModes {
    fn default() -> Self {
        Self {
            mining: StopMode::Blocking,
            training: StopMode::Blocking,
            // Model unload is long-running; keep the scheduler free while it happens.
            inference: StopMode::NonBlocking,
        }
    }
}

impl StopModes {
    pub fn for_kind(&self, kind: WorkloadKind) -> StopMode {
        match kind {
            WorkloadKind::Mining => self.mining,
            WorkloadKind::Training => self.training,
            WorkloadKind::Inference => self.inference,
        }
    }
}

pub struct ManagerRegistry {
    exclusive: ExclusiveManagers,
    models: Arc<ModelCatalog>,
    hardware: Arc<HardwareMonitor>,
    stop_modes: StopModes,
}

impl ManagerRegistry {
    pub fn new(
        exclusive: ExclusiveManagers,
        models: Arc<ModelCatalog>,
        hardware: Arc<HardwareMonitor>,
    ) -> Self {
        Self { exclusive, models, hardware, stop_modes: StopModes::default() }
    }

    pub fn with_stop_modes(mut self, stop_modes: StopModes) -> Self {
        self.stop_modes = stop_modes;
        self
    }

    /// Build process-backed managers from the loaded configuration.
    pub fn from_config(config: &NodeConfig) -> Self {
        let spec = |line: &Option<String>| line.as_deref().and_then(ProcessSpec::from_command_line);

        let inference_spec =
            spec(&config.commands.inference).map(|s| s.with_endpoints(config.backend_addrs.clone()));

        let exclusive = ExclusiveManagers {
            mining: Arc::new(ProcessManager::new(ManagedKind::Mining, spec(&config.commands.mining))),
            training: Arc::new(ProcessManager::new(
                ManagedKind::Training,
                spec(&config.commands.training),
            )),
            inference: Arc::new(ProcessManager::new(ManagedKind::Inference, inference_spec)),
        };

        Self::new(
            exclusive,
            Arc::new(ModelCatalog::new()),
            Arc::new(HardwareMonitor::new(Arc::new(DetachedSession))),
        )
        .with_stop_modes(config.stop_modes)
    }

    pub fn exclusive(&self, kind: WorkloadKind) -> &Arc<dyn ManagerLifecycle> {
        match kind {
            WorkloadKind::Mining => &self.exclusive.mining,
            WorkloadKind::Training => &self.exclusive.training,
            WorkloadKind::Inference => &self.exclusive.inference,
        }
    }

    /// Exclusive managers in watch order.
    pub fn watch_list(&self) -> Vec<(WorkloadKind, Arc<dyn ManagerLifecycle>)> {
        WorkloadKind::ALL.iter().map(|&kind| (kind, Arc::clone(self.exclusive(kind)))).collect()
    }

    pub fn models(&self) -> &Arc<ModelCatalog> {
        &self.models
    }

    pub fn hardware(&self) -> &Arc<HardwareMonitor> {
        &self.hardware
    }

    pub fn stop_mode(&self, kind: WorkloadKind) -> StopMode {
        self.stop_modes.for_kind(kind)
    }

    pub fn stop_modes(&self) -> StopModes {
        self.stop_modes
    }

    /// Stop an exclusive workload through the given path.
    pub async fn stop_with_mode(&self, kind: WorkloadKind, mode: StopMode) -> Result<(), ManagerError> {
        let manager = self.exclusive(kind);
        debug!(workload = %kind, mode = mode.as_str(), "stopping workload");
        match mode {
            StopMode::Blocking => manager.stop(),
            StopMode::NonBlocking => manager.stop_nonblocking().await,
        }
    }

    /// Stop an exclusive workload through its configured path.
    pub async fn stop_exclusive(&self, kind: WorkloadKind) -> Result<(), ManagerError> {
        self.stop_with_mode(kind, self.stop_mode(kind)).await
    }

    /// Health of every manager: exclusive ones in watch order, then the rest.
    pub fn snapshots(&self) -> Vec<HealthSnapshot> {
        let mut out: Vec<HealthSnapshot> =
            WorkloadKind::ALL.iter().map(|&kind| self.exclusive(kind).health()).collect();
        out.push(self.models.health());
        out.push(self.hardware.health());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::{Journal, MockManager};

    fn registry(journal: &Journal) -> ManagerRegistry {
        let mock = |kind| -> Arc<dyn ManagerLifecycle> {
            Arc::new(MockManager::new(kind).with_journal(journal.clone()))
        };
        ManagerRegistry::new(
            ExclusiveManagers {
                mining: mock(ManagedKind::Mining),
                training: mock(ManagedKind::Training),
                inference: mock(ManagedKind::Inference),
            },
            Arc::new(ModelCatalog::new()),
            Arc::new(HardwareMonitor::new(Arc::new(DetachedSession))),
        )
    }

    #[test]
    fn test_watch_list_order() {
        let registry = registry(&Journal::default());
        let kinds: Vec<WorkloadKind> = registry.watch_list().into_iter().map(|(k, _)| k).collect();
        assert_eq!(kinds, WorkloadKind::ALL.to_vec());
    }

    #[test]
    fn test_default_stop_modes() {
        let modes = StopModes::default();
        assert_eq!(modes.for_kind(WorkloadKind::Inference), StopMode::NonBlocking);
        assert_eq!(modes.for_kind(WorkloadKind::Mining), StopMode::Blocking);
        assert_eq!(modes.for_kind(WorkloadKind::Training), StopMode::Blocking);
    }

    #[tokio::test]
    async fn test_stop_dispatches_by_mode() {
        let journal = Journal::default();
        let registry = registry(&journal).with_stop_modes(StopModes {
            mining: StopMode::NonBlocking,
            ..StopModes::default()
        });

        registry.stop_exclusive(WorkloadKind::Mining).await.unwrap();
        registry.stop_exclusive(WorkloadKind::Training).await.unwrap();
        registry.stop_exclusive(WorkloadKind::Inference).await.unwrap();

        assert_eq!(
            journal.entries(),
            vec!["stop_nonblocking:mining", "stop:training", "stop_nonblocking:inference"]
        );
    }

    #[test]
    fn test_snapshots_cover_every_manager() {
        let registry = registry(&Journal::default());
        let kinds: Vec<ManagedKind> = registry.snapshots().into_iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ManagedKind::Mining,
                ManagedKind::Training,
                ManagedKind::Inference,
                ManagedKind::ModelRegistry,
                ManagedKind::HardwareMonitor,
            ]
        );
    }
}
