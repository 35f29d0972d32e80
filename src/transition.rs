// Copyright 2024-2026 Node Orchestrator Contributors
// Licensed under the Apache License, Version 2.0

//! Tracks exclusive workloads that are mid-start or mid-stop.
//!
//! Between the gate reservation and the end of `start`, a manager reports
//! not running while the gate already names it owner. The watcher consults
//! this tracker so it never mistakes that window for a crash.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::managers::WorkloadKind;

#[derive(Clone, Default)]
pub struct TransitionTracker {
    active: Arc<Mutex<HashMap<WorkloadKind, u32>>>,
}

impl TransitionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `kind` as transitioning until the returned guard drops.
    pub fn begin(&self, kind: WorkloadKind) -> TransitionGuard {
        *self.active.lock().entry(kind).or_insert(0) += 1;
        TransitionGuard { active: Arc::clone(&self.active), kind }
    }

    pub fn in_transition(&self, kind: WorkloadKind) -> bool {
        self.active.lock().get(&kind).is_some_and(|n| *n > 0)
    }
}

/// RAII guard that ends a transition on drop.
pub struct TransitionGuard {
    active: Arc<Mutex<HashMap<WorkloadKind, u32>>>,
    kind: WorkloadKind,
}

impl Drop for TransitionGuard {
    fn drop(&mut self) {
        let mut active = self.active.lock();
        if let Some(n) = active.get_mut(&self.kind) {
            *n = n.saturating_sub(1);
            if *n == 0 {
                active.remove(&self.kind);
            }
        }
    }
}
