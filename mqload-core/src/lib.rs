// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! mqload Core Library
//!
//! Concurrent MQTT publish/subscribe load generation for broker benchmarks.
//! Provides run configuration and topology loading, the worker pool,
//! publisher and subscriber workers, the broker transport, result
//! aggregation and run reports.

pub mod aggregator;
pub mod config;
pub mod envelope;
pub mod error;
pub mod pool;
pub mod registry;
pub mod report;
pub mod state;
pub mod topology;
pub mod transport;
pub mod types;
pub mod worker;

// Re-export commonly used types
pub use aggregator::{summarize, AggregateResult, DelayRecord, DelayStats, RoleSummary, Sample};
pub use config::{BrokerEndpoint, ConfigLoader, RawHarnessConfig, RunPlan, WorkerConfig};
pub use envelope::Envelope;
pub use error::{
    ConfigurationError, HarnessError, HarnessResult, TransportError, WorkerFailure,
};
pub use pool::{RunOutcome, WorkerPool};
pub use registry::{Unfinished, WorkerRegistry};
pub use report::{DelayLog, JsonReporter, RunReport, RunSummary};
pub use state::{WorkerState, WorkerStateMachine};
pub use topology::{TopicSet, TopicTopology, TopologyLoader};
pub use transport::{LoopbackBroker, MqttConnector};
pub use types::{PayloadSize, Port, QosLevel, Role, Timestamp, WorkerId};
