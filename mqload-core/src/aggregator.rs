// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Result channels and summary statistics.
//!
//! Workers are the only producers: each hands over exactly one [`Sample`] and
//! at most one batch of [`DelayRecord`]s. The coordinator is the single
//! consumer and drains both channels once every worker has stopped.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::WorkerFailure;
use crate::types::{Role, Timestamp, WorkerId};

/// How a worker ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    Completed { total_duration: Duration },
    Failed { failure: WorkerFailure },
}

/// One worker's observation, owned by the aggregator after hand-off.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub worker_id: WorkerId,
    pub role: Role,
    /// Messages published or received.
    pub messages: u64,
    /// Per-message end-to-end delays in microseconds (subscribers only).
    pub delays: Vec<i64>,
    pub outcome: SampleOutcome,
}

impl Sample {
    pub fn completed(worker_id: WorkerId, role: Role, messages: u64, total_duration: Duration) -> Self {
        Self {
            worker_id,
            role,
            messages,
            delays: Vec::new(),
            outcome: SampleOutcome::Completed { total_duration },
        }
    }

    pub fn failed(worker_id: WorkerId, role: Role, messages: u64, failure: WorkerFailure) -> Self {
        Self {
            worker_id,
            role,
            messages,
            delays: Vec::new(),
            outcome: SampleOutcome::Failed { failure },
        }
    }

    /// Attach per-message delays.
    pub fn with_delays(mut self, delays: Vec<i64>) -> Self {
        self.delays = delays;
        self
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, SampleOutcome::Completed { .. })
    }

    pub fn total_duration(&self) -> Option<Duration> {
        match self.outcome {
            SampleOutcome::Completed { total_duration } => Some(total_duration),
            SampleOutcome::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&WorkerFailure> {
        match &self.outcome {
            SampleOutcome::Failed { failure } => Some(failure),
            SampleOutcome::Completed { .. } => None,
        }
    }
}

/// One row of the per-run delay log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DelayRecord {
    pub publisher_id: String,
    pub origin_host: String,
    pub sent_at: Timestamp,
    pub subscriber_id: WorkerId,
    pub destination_host: String,
    pub arrived_at: Timestamp,
    pub e2e_delay_micros: i64,
}

/// Producer side of the result channels, cloned into every worker.
#[derive(Debug, Clone)]
pub struct ResultSender {
    samples: mpsc::UnboundedSender<Sample>,
    records: mpsc::UnboundedSender<Vec<DelayRecord>>,
}

impl ResultSender {
    /// Hand a sample over. Returns false if the collector is gone.
    pub fn send_sample(&self, sample: Sample) -> bool {
        self.samples.send(sample).is_ok()
    }

    /// Hand a batch of delay records over.
    pub fn send_records(&self, records: Vec<DelayRecord>) -> bool {
        records.is_empty() || self.records.send(records).is_ok()
    }
}

/// Consumer side of the result channels.
#[derive(Debug)]
pub struct ResultCollector {
    samples: mpsc::UnboundedReceiver<Sample>,
    records: mpsc::UnboundedReceiver<Vec<DelayRecord>>,
}

impl ResultCollector {
    /// Take everything handed over so far.
    pub fn drain(mut self) -> (Vec<Sample>, Vec<DelayRecord>) {
        let mut samples = Vec::new();
        while let Ok(sample) = self.samples.try_recv() {
            samples.push(sample);
        }

        let mut records = Vec::new();
        while let Ok(batch) = self.records.try_recv() {
            records.extend(batch);
        }

        (samples, records)
    }
}

/// Create a connected sender/collector pair.
pub fn result_channel() -> (ResultSender, ResultCollector) {
    let (samples_tx, samples_rx) = mpsc::unbounded_channel();
    let (records_tx, records_rx) = mpsc::unbounded_channel();
    (
        ResultSender {
            samples: samples_tx,
            records: records_tx,
        },
        ResultCollector {
            samples: samples_rx,
            records: records_rx,
        },
    )
}

/// Duration statistics of one worker population. Durations in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AggregateResult {
    pub sample_count: usize,
    pub mean: f64,
    pub std_dev: f64,
    /// Messages per second for one client.
    pub avg_throughput: f64,
    /// Messages per second across all clients of the role.
    pub total_throughput: f64,
}

/// Mean and population standard deviation of the completed samples' durations.
///
/// No completed samples gives all zeros.
pub fn summarize<'a>(
    samples: impl IntoIterator<Item = &'a Sample>,
    message_count: u64,
    worker_count: usize,
) -> AggregateResult {
    let durations: Vec<f64> = samples
        .into_iter()
        .filter_map(Sample::total_duration)
        .map(|d| d.as_secs_f64())
        .collect();

    if durations.is_empty() {
        return AggregateResult::default();
    }

    let n = durations.len() as f64;
    let mean = durations.iter().sum::<f64>() / n;
    let variance = durations
        .iter()
        .map(|d| {
            let diff = d - mean;
            diff * diff
        })
        .sum::<f64>()
        / n;

    let (avg_throughput, total_throughput) = if mean > 0.0 {
        (
            message_count as f64 / mean,
            (message_count as f64 * worker_count as f64) / mean,
        )
    } else {
        (0.0, 0.0)
    };

    AggregateResult {
        sample_count: durations.len(),
        mean,
        std_dev: variance.sqrt(),
        avg_throughput,
        total_throughput,
    }
}

/// Failure of one worker, for summaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureEntry {
    pub worker_id: WorkerId,
    pub failure: WorkerFailure,
}

/// Everything reported for one role.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleSummary {
    pub role: Role,
    /// Workers spawned.
    pub expected: usize,
    /// Workers that completed.
    pub completed: usize,
    /// Messages published or received across all workers.
    pub messages: u64,
    pub aggregate: AggregateResult,
    pub failures: Vec<FailureEntry>,
}

impl RoleSummary {
    /// Summarize the samples of `role`.
    pub fn from_samples(role: Role, samples: &[Sample], expected: usize, message_count: u64) -> Self {
        let own = || samples.iter().filter(move |s| s.role == role);

        let failures = own()
            .filter_map(|s| {
                s.failure().map(|failure| FailureEntry {
                    worker_id: s.worker_id.clone(),
                    failure: failure.clone(),
                })
            })
            .collect();

        Self {
            role,
            expected,
            completed: own().filter(|s| s.is_completed()).count(),
            messages: own().map(|s| s.messages).sum(),
            aggregate: summarize(own(), message_count, expected),
            failures,
        }
    }

    /// Spawned workers without a successful sample.
    pub fn deficit(&self) -> usize {
        self.expected.saturating_sub(self.completed)
    }

    pub fn is_degraded(&self) -> bool {
        self.deficit() > 0
    }
}

/// End-to-end delay statistics across every received message, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct DelayStats {
    pub count: usize,
    pub mean_micros: f64,
    pub std_dev_micros: f64,
    pub min_micros: i64,
    pub max_micros: i64,
    pub p50_micros: i64,
    pub p95_micros: i64,
    pub p99_micros: i64,
}

impl DelayStats {
    pub fn from_samples(samples: &[Sample]) -> Self {
        let delays: Vec<i64> = samples.iter().flat_map(|s| s.delays.iter().copied()).collect();
        Self::from_delays(&delays)
    }

    pub fn from_delays(delays: &[i64]) -> Self {
        if delays.is_empty() {
            return Self::default();
        }

        let n = delays.len() as f64;
        let mean = delays.iter().map(|&d| d as f64).sum::<f64>() / n;
        let variance = delays
            .iter()
            .map(|&d| {
                let diff = d as f64 - mean;
                diff * diff
            })
            .sum::<f64>()
            / n;

        let mut sorted = delays.to_vec();
        sorted.sort_unstable();
        let len = sorted.len();
        let percentile = |p: f64| sorted[((len as f64 * p) as usize).min(len - 1)];

        Self {
            count: len,
            mean_micros: mean,
            std_dev_micros: variance.sqrt(),
            min_micros: sorted[0],
            max_micros: sorted[len - 1],
            p50_micros: sorted[len / 2],
            p95_micros: percentile(0.95),
            p99_micros: percentile(0.99),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> WorkerId {
        WorkerId::new(name).unwrap()
    }

    fn completed(name: &str, secs: f64) -> Sample {
        Sample::completed(id(name), Role::Publisher, 10, Duration::from_secs_f64(secs))
    }

    #[test]
    fn test_summarize_empty_is_zero() {
        let empty: Vec<Sample> = Vec::new();
        let result = summarize(&empty, 100, 4);
        assert_eq!(result, AggregateResult::default());
        assert_eq!(result.sample_count, 0);
        assert_eq!(result.total_throughput, 0.0);
    }

    #[test]
    fn test_summarize_statistics() {
        let samples = vec![completed("pub0", 1.0), completed("pub1", 3.0)];
        let result = summarize(&samples, 10, 2);

        assert_eq!(result.sample_count, 2);
        assert!((result.mean - 2.0).abs() < 1e-9);
        // Population standard deviation
        assert!((result.std_dev - 1.0).abs() < 1e-9);
        assert!((result.avg_throughput - 5.0).abs() < 1e-9);
        assert!((result.total_throughput - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_summarize_ignores_failures() {
        let samples = vec![
            completed("pub0", 2.0),
            Sample::failed(
                id("pub1"),
                Role::Publisher,
                0,
                WorkerFailure::ConnectionFailure {
                    reason: "refused".to_string(),
                },
            ),
        ];
        let result = summarize(&samples, 10, 2);
        assert_eq!(result.sample_count, 1);
        assert!((result.mean - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_role_summary_deficit() {
        let samples = vec![
            completed("pub0", 1.0),
            Sample::failed(
                id("pub1"),
                Role::Publisher,
                4,
                WorkerFailure::PublishTimeout { sent: 4, target: 10 },
            ),
            Sample::completed(id("sub0"), Role::Subscriber, 14, Duration::from_secs(1)),
        ];

        let summary = RoleSummary::from_samples(Role::Publisher, &samples, 3, 10);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.deficit(), 2);
        assert_eq!(summary.messages, 14);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].worker_id, id("pub1"));
        assert!(summary.is_degraded());
    }

    #[test]
    fn test_delay_stats() {
        let stats = DelayStats::from_delays(&[100, 300, -50]);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min_micros, -50);
        assert_eq!(stats.max_micros, 300);
        assert!((stats.mean_micros - 350.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.p50_micros, 100);
        assert_eq!(stats.p99_micros, 300);
        assert_eq!(DelayStats::from_delays(&[]), DelayStats::default());
    }

    #[test]
    fn test_delay_percentiles() {
        // Unsorted on purpose
        let delays: Vec<i64> = (1..=100).rev().collect();
        let stats = DelayStats::from_delays(&delays);
        assert_eq!(stats.p50_micros, 51);
        assert_eq!(stats.p95_micros, 96);
        assert_eq!(stats.p99_micros, 100);

        let single = DelayStats::from_delays(&[-7]);
        assert_eq!(single.p50_micros, -7);
        assert_eq!(single.p99_micros, -7);
    }

    #[tokio::test]
    async fn test_channel_drain() {
        let (sender, collector) = result_channel();
        let worker = sender.clone();
        tokio::spawn(async move {
            worker.send_sample(completed("pub0", 1.0));
            worker.send_records(vec![DelayRecord {
                publisher_id: "pub0".to_string(),
                origin_host: "h".to_string(),
                sent_at: Timestamp::from_micros(1),
                subscriber_id: WorkerId::new("sub0").unwrap(),
                destination_host: "h".to_string(),
                arrived_at: Timestamp::from_micros(5),
                e2e_delay_micros: 4,
            }]);
        })
        .await
        .unwrap();
        drop(sender);

        let (samples, records) = collector.drain();
        assert_eq!(samples.len(), 1);
        assert_eq!(records[0].e2e_delay_micros, 4);
    }
}
