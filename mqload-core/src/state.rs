// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Worker state machine with typed state transitions.
//!
//! Publisher: Disconnected → Connecting → Connected → Publishing → Done | Failed.
//! Subscriber: Disconnected → Connecting → Connected → Subscribed → Receiving → Done | Failed.
//! Invalid transitions result in StateTransitionError.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::StateTransitionError;
use crate::types::WorkerId;

/// Worker lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerState {
    /// Spawned, no connection attempt yet.
    Disconnected,

    /// Waiting for the broker to acknowledge the connection.
    Connecting,

    /// Connection acknowledged.
    Connected,

    /// Publisher is emitting messages.
    Publishing,

    /// Subscriber holds all of its subscriptions.
    Subscribed,

    /// Subscriber has received at least one message.
    Receiving,

    /// Terminal: target reached.
    Done,

    /// Terminal: the worker gave up.
    Failed,
}

impl WorkerState {
    /// Get the state name for error messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Publishing => "Publishing",
            Self::Subscribed => "Subscribed",
            Self::Receiving => "Receiving",
            Self::Done => "Done",
            Self::Failed => "Failed",
        }
    }

    /// Whether the state is final.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Check if transition to the target state is valid.
    pub fn can_transition_to(&self, target: WorkerState) -> bool {
        matches!(
            (self, target),
            (Self::Disconnected, Self::Connecting) |
            (Self::Connecting, Self::Connected) |
            (Self::Connected, Self::Publishing) |
            (Self::Connected, Self::Subscribed) |
            (Self::Publishing, Self::Done) |
            // A subscriber with a zero message target is done once subscribed
            (Self::Subscribed, Self::Receiving) |
            (Self::Subscribed, Self::Done) |
            (Self::Receiving, Self::Done)
        ) || (!self.is_terminal() && target == Self::Failed)
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// State machine for a worker's lifecycle.
#[derive(Debug)]
pub struct WorkerStateMachine {
    worker_id: WorkerId,
    current_state: WorkerState,
    last_transition: Instant,
}

impl WorkerStateMachine {
    /// Create a new state machine for a worker.
    pub fn new(worker_id: WorkerId) -> Self {
        Self {
            worker_id,
            current_state: WorkerState::Disconnected,
            last_transition: Instant::now(),
        }
    }

    /// Get the current state.
    pub fn state(&self) -> WorkerState {
        self.current_state
    }

    /// Get time since last transition.
    pub fn time_in_current_state(&self) -> Duration {
        self.last_transition.elapsed()
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&mut self, target: WorkerState) -> Result<(), StateTransitionError> {
        if self.current_state.is_terminal() {
            return Err(StateTransitionError::TerminalState {
                worker_id: self.worker_id.clone(),
                state: self.current_state.name(),
            });
        }

        if !self.current_state.can_transition_to(target) {
            return Err(StateTransitionError::InvalidTransition {
                worker_id: self.worker_id.clone(),
                from: self.current_state.name(),
                to: target.name(),
            });
        }

        tracing::debug!(
            worker_id = %self.worker_id,
            from = self.current_state.name(),
            to = target.name(),
            "State transition"
        );

        self.current_state = target;
        self.last_transition = Instant::now();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_worker_id() -> WorkerId {
        WorkerId::new("sub0").unwrap()
    }

    #[test]
    fn test_initial_state() {
        let sm = WorkerStateMachine::new(make_worker_id());
        assert_eq!(sm.state(), WorkerState::Disconnected);
    }

    #[test]
    fn test_subscriber_path() {
        let mut sm = WorkerStateMachine::new(make_worker_id());
        for state in [
            WorkerState::Connecting,
            WorkerState::Connected,
            WorkerState::Subscribed,
            WorkerState::Receiving,
            WorkerState::Done,
        ] {
            sm.transition_to(state).unwrap();
        }
        assert_eq!(sm.state(), WorkerState::Done);
    }

    #[test]
    fn test_publisher_path() {
        let mut sm = WorkerStateMachine::new(WorkerId::new("pub0").unwrap());
        sm.transition_to(WorkerState::Connecting).unwrap();
        sm.transition_to(WorkerState::Connected).unwrap();
        sm.transition_to(WorkerState::Publishing).unwrap();
        sm.transition_to(WorkerState::Done).unwrap();
        assert!(sm.state().is_terminal());
    }

    #[test]
    fn test_time_in_state_resets_on_transition() {
        let mut sm = WorkerStateMachine::new(make_worker_id());
        std::thread::sleep(Duration::from_millis(50));
        assert!(sm.time_in_current_state() >= Duration::from_millis(50));

        sm.transition_to(WorkerState::Connecting).unwrap();
        assert!(sm.time_in_current_state() < Duration::from_millis(50));
    }

    #[test]
    fn test_invalid_transitions() {
        let mut sm = WorkerStateMachine::new(make_worker_id());

        // Disconnected → Subscribed skips the connection
        assert!(sm.transition_to(WorkerState::Subscribed).is_err());
        assert_eq!(sm.state(), WorkerState::Disconnected);
    }

    #[test]
    fn test_failed_from_any_live_state() {
        let mut sm = WorkerStateMachine::new(make_worker_id());
        sm.transition_to(WorkerState::Connecting).unwrap();
        sm.transition_to(WorkerState::Failed).unwrap();

        // Terminal states are final
        assert!(matches!(
            sm.transition_to(WorkerState::Connecting),
            Err(StateTransitionError::TerminalState { .. })
        ));
    }
}
