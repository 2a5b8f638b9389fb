// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for mqload.
//!
//! Configuration problems are fatal and surface before any worker starts.
//! Per-worker problems never leave the pool as errors: they are captured as
//! [`WorkerFailure`] values inside the worker's result sample.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::WorkerId;

/// Top-level error type for the harness.
#[derive(Debug, Error)]
pub enum HarnessError {
    // =========================================================================
    // Configuration Errors - Abort Before Any Worker Starts
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    // =========================================================================
    // Worker Lifecycle Errors
    // =========================================================================
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(#[from] StateTransitionError),

    #[error("Worker not found: {0}")]
    WorkerNotFound(WorkerId),

    #[error("Worker already registered: {0}")]
    WorkerAlreadyExists(WorkerId),

    // =========================================================================
    // Transport and Output Errors
    // =========================================================================
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),
}

/// Invalid parameter combinations. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Missing required field: {field} ({context})")]
    MissingRequiredField {
        field: &'static str,
        context: String,
    },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid port: {port} - {reason}")]
    InvalidPort { port: u16, reason: String },

    #[error("Payload size {size} is below the minimum of {min} bytes")]
    PayloadTooSmall { size: usize, min: usize },

    #[error("Payload size {size} exceeds the maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Both --topic and --multiple-topics were given; use exactly one")]
    ConflictingTopics,

    #[error("Neither --topic nor --multiple-topics was given")]
    MissingTopic,

    #[error("A password was given without a username")]
    PasswordWithoutUsername,

    #[error("Topology file not found: {path}")]
    TopologyNotFound { path: PathBuf },

    #[error("Topology parse error: {message}")]
    TopologyParse { message: String },

    #[error("Topology schema violation (cluster {cluster}): {message}")]
    TopologySchema { cluster: usize, message: String },

    #[error(
        "Topology assigns {assigned} {role} workers but only {configured} are configured"
    )]
    TopologyExceedsClients {
        role: &'static str,
        assigned: usize,
        configured: usize,
    },

    #[error("Cannot read CA certificate {path}: {source}")]
    CaCertificate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// State transition errors for the worker state machine.
#[derive(Debug, Error)]
pub enum StateTransitionError {
    #[error("Cannot transition from {from} to {to} for worker {worker_id}")]
    InvalidTransition {
        worker_id: WorkerId,
        from: &'static str,
        to: &'static str,
    },

    #[error("Worker {worker_id} is in terminal state: {state}")]
    TerminalState {
        worker_id: WorkerId,
        state: &'static str,
    },
}

/// Errors raised by a broker connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection to {endpoint} failed: {reason}")]
    ConnectFailed { endpoint: String, reason: String },

    #[error("Broker rejected the connection: {reason}")]
    Rejected { reason: String },

    #[error("Client request '{operation}' failed: {reason}")]
    Request {
        operation: &'static str,
        reason: String,
    },

    #[error("Connection closed: {reason}")]
    Closed { reason: String },
}

/// Malformed message envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("Envelope is not valid UTF-8")]
    NotUtf8,

    #[error("Envelope has {found} fields, expected at least {expected}")]
    MissingFields { found: usize, expected: usize },

    #[error("Envelope field '{field}' is not a valid number: {value}")]
    InvalidNumber { field: &'static str, value: String },
}

/// Errors while writing logs and reports.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Why a single worker did not complete. Captured in its sample, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerFailure {
    #[error("connection failure: {reason}")]
    ConnectionFailure { reason: String },

    #[error("publish timeout after {sent} of {target} messages")]
    PublishTimeout { sent: u64, target: u64 },

    #[error("subscribe timeout: not subscribed within the worker timeout")]
    SubscribeTimeout,

    #[error("idle timeout after {received} of {target} messages")]
    IdleTimeout { received: u64, target: u64 },

    #[error("connection lost: {reason}")]
    ConnectionLost { reason: String },

    #[error("run deadline exceeded while {state}")]
    DeadlineExceeded { state: String },

    #[error("worker task panicked")]
    Panicked,
}

impl WorkerFailure {
    /// Short machine-friendly label used in summaries.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::ConnectionFailure { .. } => "connection_failure",
            Self::PublishTimeout { .. } => "publish_timeout",
            Self::SubscribeTimeout => "subscribe_timeout",
            Self::IdleTimeout { .. } => "idle_timeout",
            Self::ConnectionLost { .. } => "connection_lost",
            Self::DeadlineExceeded { .. } => "deadline_exceeded",
            Self::Panicked => "panicked",
        }
    }
}

/// Result type alias using HarnessError.
pub type HarnessResult<T> = Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let err = ConfigurationError::PayloadTooSmall { size: 40, min: 50 };
        assert!(err.to_string().contains("40"));
        assert!(err.to_string().contains("50"));
    }

    #[test]
    fn test_error_chain() {
        let err: HarnessError = ConfigurationError::ConflictingTopics.into();
        assert!(matches!(
            err,
            HarnessError::Configuration(ConfigurationError::ConflictingTopics)
        ));
    }

    #[test]
    fn test_transport_errors_compare_by_value() {
        let closed = TransportError::Closed {
            reason: "reset".to_string(),
        };
        assert_eq!(closed.clone(), closed);
        assert_ne!(
            closed,
            TransportError::Rejected {
                reason: "reset".to_string()
            }
        );
    }

    #[test]
    fn test_worker_failure_serializes_with_kind() {
        let failure = WorkerFailure::IdleTimeout {
            received: 30,
            target: 100,
        };
        let json = serde_json::to_string(&failure).unwrap();
        assert!(json.contains("\"kind\":\"idle_timeout\""));
        assert_eq!(failure.label(), "idle_timeout");
    }
}
