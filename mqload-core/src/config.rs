// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Run configuration with strict validation.
//!
//! The CLI fills a [`RawHarnessConfig`] from arguments, environment and
//! defaults. [`ConfigLoader::build`] validates it into a [`RunPlan`]: one
//! immutable [`WorkerConfig`] per worker. Any invalid field results in a
//! [`ConfigurationError`] before a single connection is attempted.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::envelope::{Envelope, SEPARATOR};
use crate::error::{ConfigurationError, HarnessResult};
use crate::topology::{TopicSet, TopologyLoader};
use crate::types::{PayloadSize, Port, QosLevel, Role, WorkerId};

/// Default message size in bytes.
pub const DEFAULT_MESSAGE_SIZE: usize = 1024;
/// Default publisher and subscriber timeout.
pub const DEFAULT_WORKER_TIMEOUT: Duration = Duration::from_secs(60);
/// Default subscriber idle timeout.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Unvalidated run parameters as collected by the CLI.
#[derive(Debug, Clone)]
pub struct RawHarnessConfig {
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub pub_clients: usize,
    pub sub_clients: usize,
    pub pub_count: u64,
    pub sub_count: u64,
    pub message_size: usize,
    pub qos: u8,
    pub sub_timeout: Duration,
    pub pub_timeout: Duration,
    pub idle_timeout: Duration,
    pub delay: Duration,
    pub topic: Option<String>,
    pub multiple_topics: Option<PathBuf>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub cacert: Option<PathBuf>,
    /// Name of the load generator host, embedded in every payload.
    pub client_host: String,
    /// Hard deadline for the whole run; derived from the worker timeouts when absent.
    pub run_timeout: Option<Duration>,
}

impl Default for RawHarnessConfig {
    fn default() -> Self {
        Self {
            hostname: None,
            port: None,
            pub_clients: 0,
            sub_clients: 0,
            pub_count: 0,
            sub_count: 0,
            message_size: DEFAULT_MESSAGE_SIZE,
            qos: 0,
            sub_timeout: DEFAULT_WORKER_TIMEOUT,
            pub_timeout: DEFAULT_WORKER_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            delay: Duration::ZERO,
            topic: None,
            multiple_topics: None,
            username: None,
            password: None,
            cacert: None,
            client_host: "localhost".to_string(),
            run_timeout: None,
        }
    }
}

/// Broker login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

/// Validated broker endpoint shared by all workers of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: Port,
    /// CA certificate enabling TLS.
    pub ca_cert: Option<PathBuf>,
    pub credentials: Option<Credentials>,
}

impl BrokerEndpoint {
    /// Plain-TCP endpoint without credentials.
    pub fn plain(host: impl Into<String>, port: Port) -> Self {
        Self {
            host: host.into(),
            port,
            ca_cert: None,
            credentials: None,
        }
    }

    pub fn uses_tls(&self) -> bool {
        self.ca_cert.is_some()
    }
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Validated configuration of one worker. Immutable once the worker starts.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub id: WorkerId,
    pub role: Role,
    /// MQTT client id, unique per run.
    pub client_id: String,
    pub endpoint: BrokerEndpoint,
    pub topics: TopicSet,
    pub qos: QosLevel,
    /// Messages to publish, or messages to receive before completing.
    pub message_count: u64,
    pub payload_size: PayloadSize,
    /// Pause between two publishes.
    pub delay: Duration,
    /// Publishers: connect and publish everything. Subscribers: reach Subscribed.
    pub timeout: Duration,
    /// Subscribers: maximum silence between two messages.
    pub idle_timeout: Duration,
    pub origin_host: String,
}

/// Run-level parameters echoed in summaries and reports.
#[derive(Debug, Clone, Serialize)]
pub struct PlanParameters {
    pub broker: String,
    pub tls: bool,
    pub pub_clients: usize,
    pub sub_clients: usize,
    pub pub_count: u64,
    pub sub_count: u64,
    pub message_size: usize,
    pub qos: QosLevel,
    pub delay_ms: u64,
    pub sub_timeout_secs: f64,
    pub pub_timeout_secs: f64,
    pub idle_timeout_secs: f64,
    pub run_timeout_secs: f64,
    pub origin_host: String,
}

/// Complete validated run.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub run_id: Uuid,
    pub workers: Vec<WorkerConfig>,
    /// Hard deadline for the whole run.
    pub run_timeout: Duration,
    /// Bound on waiting for subscribers before releasing publishers.
    pub sub_timeout: Duration,
    pub parameters: PlanParameters,
}

impl RunPlan {
    /// Workers of a role, in id order.
    pub fn workers_of(&self, role: Role) -> impl Iterator<Item = &WorkerConfig> {
        self.workers.iter().filter(move |w| w.role == role)
    }

    /// Number of workers of a role that will be spawned.
    pub fn spawned(&self, role: Role) -> usize {
        self.workers_of(role).count()
    }

    /// Message target used by the throughput figures of a role.
    pub fn message_count(&self, role: Role) -> u64 {
        match role {
            Role::Publisher => self.parameters.pub_count,
            Role::Subscriber => self.parameters.sub_count,
        }
    }
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Validate raw parameters into a run plan.
    pub fn build(raw: RawHarnessConfig) -> HarnessResult<RunPlan> {
        Ok(Self::validate(raw)?)
    }

    fn validate(raw: RawHarnessConfig) -> Result<RunPlan, ConfigurationError> {
        let endpoint = Self::validate_endpoint(&raw)?;
        let origin_host = Self::validate_origin_host(&raw.client_host)?;
        let qos = QosLevel::new(raw.qos)?;

        for (field, value) in [
            ("sub_timeout", raw.sub_timeout),
            ("pub_timeout", raw.pub_timeout),
            ("idle_timeout", raw.idle_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigurationError::InvalidFieldValue {
                    field,
                    value: "0".to_string(),
                    reason: "Timeouts must be greater than zero".to_string(),
                });
            }
        }

        // The header grows with the publisher id; check the longest one
        let payload_size = PayloadSize::new(raw.message_size)?;
        let longest_pub = WorkerId::for_role(Role::Publisher, raw.pub_clients.saturating_sub(1));
        Envelope::check_fits(payload_size, &origin_host, longest_pub.as_str())?;

        let (pub_topics, sub_topics) = Self::assign_topics(&raw)?;

        let run_id = Uuid::new_v4();
        let run_prefix: String = run_id.simple().to_string().chars().take(8).collect();

        let mut workers = Vec::with_capacity(pub_topics.len() + sub_topics.len());
        for (role, sets, message_count, timeout) in [
            (Role::Subscriber, sub_topics, raw.sub_count, raw.sub_timeout),
            (Role::Publisher, pub_topics, raw.pub_count, raw.pub_timeout),
        ] {
            for (index, topics) in sets.into_iter().enumerate() {
                if role == Role::Publisher && topics.has_wildcard() {
                    return Err(ConfigurationError::InvalidFieldValue {
                        field: "topic",
                        value: topics.to_string(),
                        reason: "Publishers cannot publish to wildcard topics".to_string(),
                    });
                }

                let id = WorkerId::for_role(role, index);
                workers.push(WorkerConfig {
                    client_id: format!("{}-{}", id, run_prefix),
                    id,
                    role,
                    endpoint: endpoint.clone(),
                    topics,
                    qos,
                    message_count,
                    payload_size,
                    delay: raw.delay,
                    timeout,
                    idle_timeout: raw.idle_timeout,
                    origin_host: origin_host.clone(),
                });
            }
        }

        let run_timeout = raw
            .run_timeout
            .unwrap_or(raw.sub_timeout + raw.pub_timeout + raw.idle_timeout);

        let parameters = PlanParameters {
            broker: endpoint.to_string(),
            tls: endpoint.uses_tls(),
            pub_clients: raw.pub_clients,
            sub_clients: raw.sub_clients,
            pub_count: raw.pub_count,
            sub_count: raw.sub_count,
            message_size: payload_size.bytes(),
            qos,
            delay_ms: raw.delay.as_millis() as u64,
            sub_timeout_secs: raw.sub_timeout.as_secs_f64(),
            pub_timeout_secs: raw.pub_timeout.as_secs_f64(),
            idle_timeout_secs: raw.idle_timeout.as_secs_f64(),
            run_timeout_secs: run_timeout.as_secs_f64(),
            origin_host,
        };

        Ok(RunPlan {
            run_id,
            workers,
            run_timeout,
            sub_timeout: raw.sub_timeout,
            parameters,
        })
    }

    fn validate_endpoint(raw: &RawHarnessConfig) -> Result<BrokerEndpoint, ConfigurationError> {
        let host = raw
            .hostname
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ConfigurationError::MissingRequiredField {
                field: "hostname",
                context: "broker host name or address".to_string(),
            })?
            .to_string();

        let port = match raw.port {
            Some(port) => Port::new(port)?,
            None if raw.cacert.is_some() => Port::MQTTS,
            None => Port::MQTT,
        };

        if let Some(path) = &raw.cacert {
            std::fs::metadata(path).map_err(|source| ConfigurationError::CaCertificate {
                path: path.clone(),
                source,
            })?;
        }

        let credentials = match (&raw.username, &raw.password) {
            (Some(username), password) => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            (None, Some(_)) => return Err(ConfigurationError::PasswordWithoutUsername),
            (None, None) => None,
        };

        Ok(BrokerEndpoint {
            host,
            port,
            ca_cert: raw.cacert.clone(),
            credentials,
        })
    }

    fn validate_origin_host(host: &str) -> Result<String, ConfigurationError> {
        if host.is_empty() || host.contains(SEPARATOR) {
            return Err(ConfigurationError::InvalidFieldValue {
                field: "origin",
                value: host.to_string(),
                reason: format!("Client host must be non-empty and cannot contain '{}'", SEPARATOR),
            });
        }
        Ok(host.to_string())
    }

    /// Topic sets for (publishers, subscribers).
    fn assign_topics(
        raw: &RawHarnessConfig,
    ) -> Result<(Vec<TopicSet>, Vec<TopicSet>), ConfigurationError> {
        match (&raw.topic, &raw.multiple_topics) {
            (Some(_), Some(_)) => Err(ConfigurationError::ConflictingTopics),
            (None, None) => Err(ConfigurationError::MissingTopic),
            (Some(topic), None) => {
                let set = TopicSet::single(topic.clone())?;
                Ok((
                    vec![set.clone(); raw.pub_clients],
                    vec![set; raw.sub_clients],
                ))
            }
            (None, Some(path)) => {
                let topology = TopologyLoader::load_file(path)?;
                topology.check_capacity(raw.pub_clients, raw.sub_clients)?;
                Ok((
                    topology.assign(Role::Publisher, raw.pub_clients)?,
                    topology.assign(Role::Subscriber, raw.sub_clients)?,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarnessError;

    fn raw() -> RawHarnessConfig {
        RawHarnessConfig {
            hostname: Some("10.0.0.1".to_string()),
            pub_clients: 2,
            sub_clients: 3,
            pub_count: 10,
            sub_count: 20,
            topic: Some("bench/topic".to_string()),
            client_host: "10.0.1.7".to_string(),
            ..Default::default()
        }
    }

    fn config_error(result: HarnessResult<RunPlan>) -> ConfigurationError {
        match result {
            Err(HarnessError::Configuration(e)) => e,
            other => panic!("expected configuration error, got {:?}", other.map(|p| p.run_id)),
        }
    }

    #[test]
    fn test_valid_plan() {
        let plan = ConfigLoader::build(raw()).unwrap();

        assert_eq!(plan.spawned(Role::Publisher), 2);
        assert_eq!(plan.spawned(Role::Subscriber), 3);
        assert_eq!(plan.parameters.broker, "10.0.0.1:1883");

        let pub1 = plan.workers_of(Role::Publisher).nth(1).unwrap();
        assert_eq!(pub1.id.as_str(), "pub1");
        assert_eq!(pub1.message_count, 10);
        assert!(pub1.client_id.starts_with("pub1-"));
        assert_eq!(pub1.timeout, DEFAULT_WORKER_TIMEOUT);
    }

    #[test]
    fn test_run_timeout_derived_from_worker_timeouts() {
        let plan = ConfigLoader::build(raw()).unwrap();
        assert_eq!(plan.run_timeout, Duration::from_secs(60 + 60 + 120));

        let explicit = ConfigLoader::build(RawHarnessConfig {
            run_timeout: Some(Duration::from_secs(5)),
            ..raw()
        })
        .unwrap();
        assert_eq!(explicit.run_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_payload_below_minimum() {
        let err = config_error(ConfigLoader::build(RawHarnessConfig {
            message_size: 40,
            ..raw()
        }));
        assert!(matches!(
            err,
            ConfigurationError::PayloadTooSmall { size: 40, min: 50 }
        ));
    }

    #[test]
    fn test_payload_below_header() {
        let err = config_error(ConfigLoader::build(RawHarnessConfig {
            message_size: 60,
            client_host: "load-generator-with-a-long-name.lab".to_string(),
            ..raw()
        }));
        assert!(matches!(err, ConfigurationError::PayloadTooSmall { size: 60, .. }));
    }

    #[test]
    fn test_conflicting_topics() {
        let err = config_error(ConfigLoader::build(RawHarnessConfig {
            multiple_topics: Some(PathBuf::from("topology.json")),
            ..raw()
        }));
        assert!(matches!(err, ConfigurationError::ConflictingTopics));

        let err = config_error(ConfigLoader::build(RawHarnessConfig {
            topic: None,
            ..raw()
        }));
        assert!(matches!(err, ConfigurationError::MissingTopic));
    }

    #[test]
    fn test_password_without_username() {
        let err = config_error(ConfigLoader::build(RawHarnessConfig {
            password: Some("secret".to_string()),
            ..raw()
        }));
        assert!(matches!(err, ConfigurationError::PasswordWithoutUsername));
    }

    #[test]
    fn test_missing_hostname() {
        let err = config_error(ConfigLoader::build(RawHarnessConfig {
            hostname: Some("  ".to_string()),
            ..raw()
        }));
        assert!(matches!(
            err,
            ConfigurationError::MissingRequiredField { field: "hostname", .. }
        ));
    }

    #[test]
    fn test_invalid_qos() {
        let err = config_error(ConfigLoader::build(RawHarnessConfig { qos: 3, ..raw() }));
        assert!(matches!(err, ConfigurationError::InvalidFieldValue { field: "qos", .. }));
    }

    #[test]
    fn test_tls_default_port() {
        let dir = tempfile::TempDir::new().unwrap();
        let ca = dir.path().join("ca.pem");
        std::fs::write(&ca, "-----BEGIN CERTIFICATE-----\n").unwrap();

        let plan = ConfigLoader::build(RawHarnessConfig {
            cacert: Some(ca),
            ..raw()
        })
        .unwrap();
        assert_eq!(plan.workers[0].endpoint.port, Port::MQTTS);
        assert!(plan.parameters.tls);
    }

    #[test]
    fn test_missing_ca_certificate() {
        let err = config_error(ConfigLoader::build(RawHarnessConfig {
            cacert: Some(PathBuf::from("/nonexistent/ca.pem")),
            ..raw()
        }));
        assert!(matches!(err, ConfigurationError::CaCertificate { .. }));
    }

    #[test]
    fn test_publisher_wildcard_rejected() {
        let err = config_error(ConfigLoader::build(RawHarnessConfig {
            topic: Some("bench/#".to_string()),
            ..raw()
        }));
        assert!(matches!(err, ConfigurationError::InvalidFieldValue { field: "topic", .. }));

        // Subscribers alone may use wildcards
        let plan = ConfigLoader::build(RawHarnessConfig {
            topic: Some("bench/#".to_string()),
            pub_clients: 0,
            ..raw()
        })
        .unwrap();
        assert_eq!(plan.spawned(Role::Subscriber), 3);
    }

    #[test]
    fn test_topology_plan() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("topology.json");
        std::fs::write(
            &path,
            r#"{ "clusters": [ { "topics": ["a", "b"], "pubs": 1, "subs": 2 } ], "all": "all" }"#,
        )
        .unwrap();

        let plan = ConfigLoader::build(RawHarnessConfig {
            topic: None,
            multiple_topics: Some(path),
            ..raw()
        })
        .unwrap();

        let subs: Vec<_> = plan.workers_of(Role::Subscriber).collect();
        assert_eq!(subs.len(), 3);
        assert_eq!(subs[0].topics.to_string(), "a,b,all");
        assert_eq!(subs[2].topics.to_string(), "all");

        let pubs: Vec<_> = plan.workers_of(Role::Publisher).collect();
        assert_eq!(pubs[0].topics.to_string(), "a,b");
        assert_eq!(pubs[1].topics.to_string(), "all");
    }

    #[test]
    fn test_topology_exceeding_clients() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("topology.json");
        std::fs::write(&path, r#"{ "clusters": [ { "topics": ["a"], "pubs": 5 } ] }"#).unwrap();

        let err = config_error(ConfigLoader::build(RawHarnessConfig {
            topic: None,
            multiple_topics: Some(path),
            ..raw()
        }));
        assert!(matches!(
            err,
            ConfigurationError::TopologyExceedsClients { role: "pub", .. }
        ));
    }
}
