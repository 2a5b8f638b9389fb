// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! All types validate their invariants at creation time, so a `WorkerConfig`
//! built from them cannot carry an out-of-range value.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Smallest payload a publisher may be configured with, in bytes.
pub const MIN_PAYLOAD_SIZE: usize = 50;
/// Largest payload a publisher may be configured with, in bytes.
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Validated worker identifier (`pub0`, `sub3`, ...).
/// Must be non-empty, alphanumeric with hyphens/underscores, max 64 chars.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkerId(String);

impl WorkerId {
    /// Create a new WorkerId with validation.
    pub fn new(id: impl Into<String>) -> Result<Self, ConfigurationError> {
        let id = id.into();

        if id.is_empty() {
            return Err(ConfigurationError::InvalidFieldValue {
                field: "worker_id",
                value: id,
                reason: "Worker ID cannot be empty".to_string(),
            });
        }

        if id.len() > 64 {
            return Err(ConfigurationError::InvalidFieldValue {
                field: "worker_id",
                value: id.clone(),
                reason: format!("Worker ID too long: {} chars (max 64)", id.len()),
            });
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigurationError::InvalidFieldValue {
                field: "worker_id",
                value: id,
                reason: "Worker ID must contain only alphanumeric characters, hyphens, and underscores".to_string(),
            });
        }

        Ok(Self(id))
    }

    /// Build the id of the `index`-th worker of a role.
    pub fn for_role(role: Role, index: usize) -> Self {
        Self(format!("{}{}", role.prefix(), index))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for WorkerId {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<WorkerId> for String {
    fn from(id: WorkerId) -> Self {
        id.0
    }
}

/// Worker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Publisher,
    Subscriber,
}

impl Role {
    /// Prefix used for worker ids of this role.
    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::Publisher => "pub",
            Self::Subscriber => "sub",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Publisher => write!(f, "publisher"),
            Self::Subscriber => write!(f, "subscriber"),
        }
    }
}

/// Validated broker port.
/// Must be in range 1-65535 (0 is reserved).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Port(u16);

impl Port {
    /// Default plain-TCP MQTT port.
    pub const MQTT: Port = Port(1883);
    /// Default MQTT-over-TLS port.
    pub const MQTTS: Port = Port(8883);

    /// Create a new Port with validation.
    pub fn new(port: u16) -> Result<Self, ConfigurationError> {
        if port == 0 {
            return Err(ConfigurationError::InvalidPort {
                port,
                reason: "Port 0 is reserved and cannot be used".to_string(),
            });
        }
        Ok(Self(port))
    }

    /// Get the inner port value.
    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u16> for Port {
    type Error = ConfigurationError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Port> for u16 {
    fn from(port: Port) -> Self {
        port.0
    }
}

/// MQTT quality-of-service level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QosLevel {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QosLevel {
    /// Create a QoS level from its numeric value.
    pub fn new(level: u8) -> Result<Self, ConfigurationError> {
        match level {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(ConfigurationError::InvalidFieldValue {
                field: "qos",
                value: other.to_string(),
                reason: "QoS must be 0, 1 or 2".to_string(),
            }),
        }
    }

    /// Numeric value as carried on the wire.
    pub const fn as_u8(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for QosLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

impl TryFrom<u8> for QosLevel {
    type Error = ConfigurationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<QosLevel> for u8 {
    fn from(qos: QosLevel) -> Self {
        qos.as_u8()
    }
}

/// Validated payload size in bytes.
/// Must be between MIN_PAYLOAD_SIZE and MAX_PAYLOAD_SIZE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct PayloadSize(usize);

impl PayloadSize {
    /// Create a new PayloadSize with bounds validation.
    pub fn new(bytes: usize) -> Result<Self, ConfigurationError> {
        if bytes < MIN_PAYLOAD_SIZE {
            return Err(ConfigurationError::PayloadTooSmall {
                size: bytes,
                min: MIN_PAYLOAD_SIZE,
            });
        }
        if bytes > MAX_PAYLOAD_SIZE {
            return Err(ConfigurationError::PayloadTooLarge {
                size: bytes,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(Self(bytes))
    }

    /// Get the size in bytes.
    pub fn bytes(&self) -> usize {
        self.0
    }
}

impl fmt::Display for PayloadSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}B", self.0)
    }
}

impl TryFrom<usize> for PayloadSize {
    type Error = ConfigurationError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PayloadSize> for usize {
    fn from(size: PayloadSize) -> Self {
        size.0
    }
}

/// Wall-clock instant as integer microseconds since the Unix epoch (UTC).
///
/// Every timestamp the harness records or embeds in a payload uses this one
/// representation, so delays are plain integer subtraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        Self(Utc::now().timestamp_micros())
    }

    /// Wrap a raw microsecond value.
    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    /// Microseconds since the Unix epoch.
    pub const fn micros(&self) -> i64 {
        self.0
    }

    /// Signed microseconds elapsed from `earlier` to `self`.
    pub const fn micros_since(&self, earlier: Timestamp) -> i64 {
        self.0 - earlier.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_id_validation() {
        assert!(WorkerId::new("pub0").is_ok());
        assert!(WorkerId::new("sub-edge_1").is_ok());
        assert!(WorkerId::new("").is_err());
        assert!(WorkerId::new("a|b").is_err());
        assert!(WorkerId::new("x".repeat(65)).is_err());
    }

    #[test]
    fn test_worker_id_for_role() {
        assert_eq!(WorkerId::for_role(Role::Publisher, 3).as_str(), "pub3");
        assert_eq!(WorkerId::for_role(Role::Subscriber, 0).as_str(), "sub0");
    }

    #[test]
    fn test_port_validation() {
        assert!(Port::new(0).is_err());
        assert_eq!(Port::new(1883).unwrap(), Port::MQTT);
    }

    #[test]
    fn test_qos_levels() {
        assert_eq!(QosLevel::new(0).unwrap(), QosLevel::AtMostOnce);
        assert_eq!(QosLevel::new(2).unwrap().as_u8(), 2);
        assert!(QosLevel::new(3).is_err());
    }

    #[test]
    fn test_payload_size_bounds() {
        assert!(matches!(
            PayloadSize::new(40),
            Err(ConfigurationError::PayloadTooSmall { size: 40, min: 50 })
        ));
        assert!(PayloadSize::new(MIN_PAYLOAD_SIZE).is_ok());
        assert!(PayloadSize::new(MAX_PAYLOAD_SIZE + 1).is_err());
    }

    #[test]
    fn test_timestamp_difference() {
        let publish = Timestamp::from_micros(1_700_000_000_000_000);
        let arrival = Timestamp::from_micros(1_700_000_000_002_500);
        assert_eq!(arrival.micros_since(publish), 2_500);
        assert_eq!(publish.micros_since(arrival), -2_500);
    }
}
