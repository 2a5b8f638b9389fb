// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Worker pool coordinator.
//!
//! Spawns one task per worker, subscribers first. Publishers are released once
//! every subscriber is subscribed or has failed. The run ends when all workers
//! have reported or the global deadline passes; workers still running at the
//! deadline are aborted and get a failure marker in their place.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};

use crate::aggregator::{
    result_channel, DelayRecord, DelayStats, ResultSender, RoleSummary, Sample,
};
use crate::config::WorkerConfig;
use crate::error::{HarnessResult, WorkerFailure};
use crate::registry::WorkerRegistry;
use crate::state::WorkerState;
use crate::transport::Connector;
use crate::types::{Role, WorkerId};
use crate::worker::{run_publisher, run_subscriber, Completion, WorkerContext};

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// One sample per spawned worker: its own, or a failure marker.
    pub samples: Vec<Sample>,
    pub records: Vec<DelayRecord>,
    pub spawned_publishers: usize,
    pub spawned_subscribers: usize,
    pub elapsed: Duration,
    /// Whether the global deadline cut the run short.
    pub deadline_hit: bool,
}

impl RunOutcome {
    pub fn spawned(&self, role: Role) -> usize {
        match role {
            Role::Publisher => self.spawned_publishers,
            Role::Subscriber => self.spawned_subscribers,
        }
    }

    /// Summary of one role; `message_count` is the per-worker target.
    pub fn summary(&self, role: Role, message_count: u64) -> RoleSummary {
        RoleSummary::from_samples(role, &self.samples, self.spawned(role), message_count)
    }

    /// End-to-end delay statistics over every received message.
    pub fn delay_stats(&self) -> DelayStats {
        DelayStats::from_samples(&self.samples)
    }
}

struct Tracked {
    id: WorkerId,
    role: Role,
    completion: Completion,
}

/// Runs worker configurations against one connector.
pub struct WorkerPool<C: Connector> {
    connector: Arc<C>,
}

impl<C: Connector> WorkerPool<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
        }
    }

    /// Run every worker and wait for all of them, bounded by `global_timeout`.
    ///
    /// Only a duplicate worker id is an error; worker failures end up in the
    /// returned samples.
    pub async fn run(
        &self,
        configs: Vec<WorkerConfig>,
        global_timeout: Duration,
    ) -> HarnessResult<RunOutcome> {
        let started = Instant::now();
        let deadline = started + global_timeout;
        let registry = WorkerRegistry::new_shared();

        for config in &configs {
            registry.register(config.id.clone(), config.role)?;
        }

        let (subscribers, publishers): (Vec<_>, Vec<_>) = configs
            .into_iter()
            .partition(|c| c.role == Role::Subscriber);
        let spawned_subscribers = subscribers.len();
        let spawned_publishers = publishers.len();

        tracing::info!(
            publishers = spawned_publishers,
            subscribers = spawned_subscribers,
            timeout_secs = global_timeout.as_secs_f64(),
            "Starting run"
        );

        let (results, collector) = result_channel();
        let mut tracked = Vec::with_capacity(spawned_subscribers + spawned_publishers);
        let mut tasks = JoinSet::new();

        let gate_timeout = subscribers
            .iter()
            .map(|c| c.timeout)
            .max()
            .unwrap_or_default();
        let mut ready = Vec::with_capacity(spawned_subscribers);

        for config in subscribers {
            let (ready_tx, ready_rx) = oneshot::channel();
            ready.push(ready_rx);
            let ctx = Self::context(&registry, &results, &mut tracked, &config);
            tasks.spawn(run_subscriber(
                Arc::clone(&self.connector),
                config,
                ctx,
                ready_tx,
            ));
        }

        if !ready.is_empty() {
            let gate_deadline = (Instant::now() + gate_timeout).min(deadline);
            let all_ready = async {
                for rx in ready {
                    // A dropped sender means the subscriber failed
                    let _ = rx.await;
                }
            };
            if timeout_at(gate_deadline, all_ready).await.is_err() {
                tracing::warn!("Subscribers not ready before the subscriber timeout; releasing publishers");
            } else {
                tracing::debug!("All subscribers ready; releasing publishers");
            }
        }

        for config in publishers {
            let ctx = Self::context(&registry, &results, &mut tracked, &config);
            tasks.spawn(run_publisher(Arc::clone(&self.connector), config, ctx));
        }
        drop(results);

        let mut deadline_hit = false;
        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(()))) => {}
                Ok(Some(Err(e))) => {
                    tracing::warn!(error = %e, "Worker task ended abnormally");
                }
                Ok(None) => break,
                Err(_) => {
                    deadline_hit = true;
                    break;
                }
            }
        }

        if deadline_hit {
            for role in [Role::Subscriber, Role::Publisher] {
                let unfinished = registry.unfinished(role);
                if unfinished.is_empty() {
                    continue;
                }
                tracing::warn!(
                    role = %role,
                    unfinished = unfinished.len(),
                    "Run deadline reached; cancelling workers"
                );
                for worker in unfinished {
                    tracing::warn!(
                        worker_id = %worker.id,
                        state = %worker.state,
                        stalled_secs = worker.stalled_for.as_secs_f64(),
                        "Worker still running at the deadline"
                    );
                }
            }
            tasks.shutdown().await;
        }

        // Workers that never recorded an outcome get a failure marker
        let mut markers = Vec::new();
        for worker in &tracked {
            if !worker.completion.finish() {
                continue;
            }
            let failure = if deadline_hit {
                classify_unfinished(&registry, &worker.id)
            } else {
                WorkerFailure::Panicked
            };
            if let Err(e) = registry.transition(&worker.id, WorkerState::Failed) {
                tracing::debug!(worker_id = %worker.id, error = %e, "Could not mark worker failed");
            }
            tracing::warn!(worker_id = %worker.id, failure = %failure, "Worker did not report");
            markers.push(Sample::failed(worker.id.clone(), worker.role, 0, failure));
        }

        let (mut samples, records) = collector.drain();
        samples.extend(markers);

        let outcome = RunOutcome {
            samples,
            records,
            spawned_publishers,
            spawned_subscribers,
            elapsed: started.elapsed(),
            deadline_hit,
        };

        tracing::info!(
            elapsed_secs = outcome.elapsed.as_secs_f64(),
            samples = outcome.samples.len(),
            records = outcome.records.len(),
            deadline_hit,
            "Run finished"
        );

        Ok(outcome)
    }

    fn context(
        registry: &Arc<WorkerRegistry>,
        results: &ResultSender,
        tracked: &mut Vec<Tracked>,
        config: &WorkerConfig,
    ) -> WorkerContext {
        let completion = Completion::new();
        tracked.push(Tracked {
            id: config.id.clone(),
            role: config.role,
            completion: completion.clone(),
        });
        WorkerContext {
            registry: Arc::clone(registry),
            results: results.clone(),
            completion,
        }
    }
}

/// Failure recorded for a worker cancelled at the run deadline.
fn classify_unfinished(registry: &WorkerRegistry, id: &WorkerId) -> WorkerFailure {
    match registry.get_state(id) {
        Ok(WorkerState::Disconnected | WorkerState::Connecting) => WorkerFailure::ConnectionFailure {
            reason: "run deadline reached before the broker acknowledged the connection"
                .to_string(),
        },
        Ok(state) => WorkerFailure::DeadlineExceeded {
            state: state.name().to_string(),
        },
        Err(_) => WorkerFailure::DeadlineExceeded {
            state: "unknown".to_string(),
        },
    }
}
