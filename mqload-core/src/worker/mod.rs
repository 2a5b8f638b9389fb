// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Publisher and subscriber workers.
//!
//! Each worker owns one broker session for its whole life and reports exactly
//! one outcome. A worker never returns an error: every failure becomes a
//! [`WorkerFailure`] inside its sample.

pub mod publisher;
pub mod subscriber;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::{timeout_at, Instant};

use crate::aggregator::{DelayRecord, ResultSender, Sample};
use crate::config::WorkerConfig;
use crate::error::WorkerFailure;
use crate::registry::WorkerRegistry;
use crate::state::WorkerState;
use crate::transport::{ConnectAck, Connector, Session};
use crate::types::WorkerId;

pub use publisher::run_publisher;
pub use subscriber::run_subscriber;

/// Completion flag of one worker, set once.
///
/// Shared between the worker and the coordinator. Whoever sets it first owns
/// the worker's outcome: the worker's own sample, or the coordinator's
/// failure marker at the run deadline.
#[derive(Debug, Clone, Default)]
pub struct Completion(Arc<AtomicBool>);

impl Completion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record completion. Returns true for the first caller only.
    pub fn finish(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }
}

/// Shared handles a worker needs besides its configuration.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub registry: Arc<WorkerRegistry>,
    pub results: ResultSender,
    pub completion: Completion,
}

impl WorkerContext {
    /// Move the worker's state machine forward.
    pub(crate) fn enter(&self, id: &WorkerId, state: WorkerState) {
        if let Err(e) = self.registry.transition(id, state) {
            tracing::warn!(worker_id = %id, error = %e, "Registry rejected state change");
        }
    }

    /// Hand the final sample and delay records over.
    ///
    /// Returns false when the coordinator already recorded an outcome for
    /// this worker; the sample is then discarded.
    pub(crate) fn report(&self, sample: Sample, records: Vec<DelayRecord>) -> bool {
        if !self.completion.finish() {
            tracing::debug!(worker_id = %sample.worker_id, "Outcome already recorded, discarding sample");
            return false;
        }

        match sample.failure() {
            Some(failure) => {
                self.enter(&sample.worker_id, WorkerState::Failed);
                tracing::warn!(
                    worker_id = %sample.worker_id,
                    role = %sample.role,
                    messages = sample.messages,
                    failure = %failure,
                    "Worker failed"
                );
            }
            None => {
                self.enter(&sample.worker_id, WorkerState::Done);
                tracing::info!(
                    worker_id = %sample.worker_id,
                    role = %sample.role,
                    messages = sample.messages,
                    duration_secs = sample.total_duration().map(|d| d.as_secs_f64()).unwrap_or_default(),
                    "Worker completed"
                );
            }
        }

        self.results.send_records(records);
        self.results.send_sample(sample);
        true
    }
}

/// Connect within the worker deadline.
async fn connect<C: Connector>(
    connector: &C,
    config: &WorkerConfig,
    deadline: Instant,
) -> Result<(C::Session, ConnectAck), WorkerFailure> {
    match timeout_at(deadline, connector.connect(&config.client_id, &config.endpoint)).await {
        Ok(Ok(connection)) => Ok(connection),
        Ok(Err(e)) => Err(WorkerFailure::ConnectionFailure {
            reason: e.to_string(),
        }),
        Err(_) => Err(WorkerFailure::ConnectionFailure {
            reason: format!(
                "no acknowledgement from {} within {:?}",
                config.endpoint, config.timeout
            ),
        }),
    }
}

async fn close<S: Session>(session: &mut S, id: &WorkerId) {
    if let Err(e) = session.disconnect().await {
        tracing::debug!(worker_id = %id, error = %e, "Disconnect failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_first_writer_wins() {
        let completion = Completion::new();
        let shared = completion.clone();

        assert!(completion.finish());
        assert!(!shared.finish());
        assert!(!completion.finish());
    }
}
