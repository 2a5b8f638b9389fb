// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Thread-safe worker registry using DashMap.
//!
//! Every spawned worker owns one entry and drives its own state machine
//! through it; the coordinator reads the states when the run deadline hits.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::error::{HarnessError, HarnessResult};
use crate::state::{WorkerState, WorkerStateMachine};
use crate::types::{Role, WorkerId};

/// Entry in the worker registry.
#[derive(Debug)]
pub struct WorkerEntry {
    pub role: Role,
    pub state_machine: WorkerStateMachine,
}

/// A worker still running, as seen by [`WorkerRegistry::unfinished`].
#[derive(Debug, Clone)]
pub struct Unfinished {
    pub id: WorkerId,
    pub state: WorkerState,
    pub stalled_for: Duration,
}

/// Thread-safe registry of the workers of one run.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: DashMap<WorkerId, WorkerEntry>,
}

impl WorkerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            workers: DashMap::new(),
        }
    }

    /// Create a registry wrapped in an Arc for sharing across tasks.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a worker in the Disconnected state.
    pub fn register(&self, id: WorkerId, role: Role) -> HarnessResult<()> {
        if self.workers.contains_key(&id) {
            return Err(HarnessError::WorkerAlreadyExists(id));
        }

        let entry = WorkerEntry {
            role,
            state_machine: WorkerStateMachine::new(id.clone()),
        };
        self.workers.insert(id, entry);

        Ok(())
    }

    /// Get the current state of a worker.
    pub fn get_state(&self, id: &WorkerId) -> HarnessResult<WorkerState> {
        self.workers
            .get(id)
            .map(|entry| entry.state_machine.state())
            .ok_or_else(|| HarnessError::WorkerNotFound(id.clone()))
    }

    /// Transition a worker to a new state.
    pub fn transition(&self, id: &WorkerId, target: WorkerState) -> HarnessResult<()> {
        let mut entry = self
            .workers
            .get_mut(id)
            .ok_or_else(|| HarnessError::WorkerNotFound(id.clone()))?;

        entry.state_machine.transition_to(target)?;
        Ok(())
    }

    /// Workers of a role that have not reached a terminal state, with how
    /// long each has been stuck where it is.
    pub fn unfinished(&self, role: Role) -> Vec<Unfinished> {
        self.workers
            .iter()
            .filter(|r| r.role == role && !r.state_machine.state().is_terminal())
            .map(|r| Unfinished {
                id: r.key().clone(),
                state: r.state_machine.state(),
                stalled_for: r.state_machine.time_in_current_state(),
            })
            .collect()
    }
}
