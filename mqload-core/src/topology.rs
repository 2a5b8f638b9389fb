// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Multiple-topics topology description.
//!
//! A topology groups workers into clusters that share a topic list:
//!
//! ```json
//! {
//!   "clusters": [
//!     { "topics": ["edge/a", "edge/b"], "pubs": 2, "subs": 1 },
//!     { "topics": ["core/x"], "subs": 3 }
//!   ],
//!   "all": "broadcast",
//!   "default": ["fallback"]
//! }
//! ```
//!
//! JSON and YAML files are accepted. Any schema problem is a
//! [`ConfigurationError`] raised before a worker is spawned.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::types::Role;

/// Raw topology as parsed from the file (before validation).
#[derive(Debug, Deserialize)]
struct RawTopology {
    clusters: Vec<RawCluster>,
    #[serde(default)]
    all: Option<OneOrMany>,
    #[serde(default)]
    default: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawCluster {
    topics: Vec<String>,
    #[serde(default)]
    pubs: usize,
    #[serde(default)]
    subs: usize,
}

/// `all` accepts a single topic or a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for Vec<String> {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(topic) => vec![topic],
            OneOrMany::Many(topics) => topics,
        }
    }
}

/// Non-empty, duplicate-free list of topics a worker uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct TopicSet(Vec<String>);

impl TopicSet {
    /// Create a topic set with validation. Duplicates are dropped, order kept.
    pub fn new(topics: Vec<String>) -> Result<Self, ConfigurationError> {
        let mut unique: Vec<String> = Vec::with_capacity(topics.len());
        for topic in topics {
            if topic.is_empty() {
                return Err(ConfigurationError::InvalidFieldValue {
                    field: "topic",
                    value: topic,
                    reason: "Topic names cannot be empty".to_string(),
                });
            }
            if !unique.contains(&topic) {
                unique.push(topic);
            }
        }

        if unique.is_empty() {
            return Err(ConfigurationError::InvalidFieldValue {
                field: "topics",
                value: "[]".to_string(),
                reason: "At least one topic is required".to_string(),
            });
        }

        Ok(Self(unique))
    }

    /// A set holding one topic.
    pub fn single(topic: impl Into<String>) -> Result<Self, ConfigurationError> {
        Self::new(vec![topic.into()])
    }

    /// Topic used for the `index`-th message; publishers cycle through the set.
    pub fn topic_for(&self, index: u64) -> &str {
        &self.0[(index % self.0.len() as u64) as usize]
    }

    /// Whether any topic contains an MQTT wildcard.
    pub fn has_wildcard(&self) -> bool {
        self.0.iter().any(|t| t.contains('+') || t.contains('#'))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TopicSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(","))
    }
}

impl TryFrom<Vec<String>> for TopicSet {
    type Error = ConfigurationError;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TopicSet> for Vec<String> {
    fn from(set: TopicSet) -> Self {
        set.0
    }
}

/// One validated cluster of the topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicCluster {
    pub topics: TopicSet,
    pub publishers: usize,
    pub subscribers: usize,
}

impl TopicCluster {
    fn workers(&self, role: Role) -> usize {
        match role {
            Role::Publisher => self.publishers,
            Role::Subscriber => self.subscribers,
        }
    }
}

/// Validated topology description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicTopology {
    pub clusters: Vec<TopicCluster>,
    /// Catch-all topics added to every subscriber and to the fallback set.
    pub all: Vec<String>,
    /// Topics for workers not assigned to any cluster.
    pub default: Option<Vec<String>>,
}

impl TopicTopology {
    /// Workers of a role assigned by the clusters.
    pub fn assigned(&self, role: Role) -> usize {
        self.clusters.iter().map(|c| c.workers(role)).sum()
    }

    /// Fail if the clusters assign more workers than are configured.
    pub fn check_capacity(
        &self,
        pub_clients: usize,
        sub_clients: usize,
    ) -> Result<(), ConfigurationError> {
        for (role, configured) in [
            (Role::Publisher, pub_clients),
            (Role::Subscriber, sub_clients),
        ] {
            let assigned = self.assigned(role);
            if assigned > configured {
                return Err(ConfigurationError::TopologyExceedsClients {
                    role: role.prefix(),
                    assigned,
                    configured,
                });
            }
        }
        Ok(())
    }

    /// Topic set for the unassigned workers, if the topology provides one.
    pub fn fallback(&self) -> Option<TopicSet> {
        let mut topics = self.default.clone().unwrap_or_default();
        topics.extend(self.all.iter().cloned());
        TopicSet::new(topics).ok()
    }

    /// Topic sets for `clients` workers of a role, in worker order.
    ///
    /// Cluster workers come first. The remaining workers get the fallback set;
    /// without one they are left out, so the result may be shorter than
    /// `clients`.
    pub fn assign(&self, role: Role, clients: usize) -> Result<Vec<TopicSet>, ConfigurationError> {
        let mut sets = Vec::with_capacity(clients);

        for cluster in &self.clusters {
            let set = match role {
                Role::Publisher => cluster.topics.clone(),
                Role::Subscriber => {
                    let mut topics: Vec<String> = cluster.topics.clone().into();
                    topics.extend(self.all.iter().cloned());
                    TopicSet::new(topics)?
                }
            };
            sets.extend(std::iter::repeat(set).take(cluster.workers(role)));
        }

        let remaining = clients.saturating_sub(sets.len());
        if remaining > 0 {
            match self.fallback() {
                Some(set) => sets.extend(std::iter::repeat(set).take(remaining)),
                None => tracing::warn!(
                    role = %role,
                    remaining,
                    "Topology has no default or catch-all topics; unassigned workers will not be spawned"
                ),
            }
        }

        Ok(sets)
    }
}

/// Topology loader with strict validation.
pub struct TopologyLoader;

impl TopologyLoader {
    /// Load a topology file. `.yaml`/`.yml` files are parsed as YAML, anything else as JSON.
    pub fn load_file(path: impl AsRef<Path>) -> Result<TopicTopology, ConfigurationError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigurationError::TopologyNotFound {
                path: path.to_path_buf(),
            });
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigurationError::TopologyParse {
                message: format!("reading {}: {}", path.display(), e),
            })?;

        let is_yaml = path
            .extension()
            .map(|e| e == "yaml" || e == "yml")
            .unwrap_or(false);

        if is_yaml {
            Self::load_yaml(&content)
        } else {
            Self::load_json(&content)
        }
    }

    /// Load a topology from a JSON string.
    pub fn load_json(content: &str) -> Result<TopicTopology, ConfigurationError> {
        let raw: RawTopology =
            serde_json::from_str(content).map_err(|e| ConfigurationError::TopologyParse {
                message: format!("JSON parse error: {}", e),
            })?;
        Self::validate(raw)
    }

    /// Load a topology from a YAML string.
    pub fn load_yaml(content: &str) -> Result<TopicTopology, ConfigurationError> {
        let raw: RawTopology =
            serde_yaml::from_str(content).map_err(|e| ConfigurationError::TopologyParse {
                message: format!("YAML parse error: {}", e),
            })?;
        Self::validate(raw)
    }

    fn validate(raw: RawTopology) -> Result<TopicTopology, ConfigurationError> {
        if raw.clusters.is_empty() {
            return Err(ConfigurationError::TopologySchema {
                cluster: 0,
                message: "At least one cluster must be defined".to_string(),
            });
        }

        let mut clusters = Vec::with_capacity(raw.clusters.len());
        for (index, raw_cluster) in raw.clusters.into_iter().enumerate() {
            // Clusters are numbered from 1 in messages, like rows in the file
            let cluster = index + 1;

            if raw_cluster.pubs == 0 && raw_cluster.subs == 0 {
                return Err(ConfigurationError::TopologySchema {
                    cluster,
                    message: "pubs and subs are both missing or zero".to_string(),
                });
            }

            let topics = TopicSet::new(raw_cluster.topics).map_err(|e| {
                ConfigurationError::TopologySchema {
                    cluster,
                    message: e.to_string(),
                }
            })?;

            clusters.push(TopicCluster {
                topics,
                publishers: raw_cluster.pubs,
                subscribers: raw_cluster.subs,
            });
        }

        let all: Vec<String> = raw.all.map(Into::into).unwrap_or_default();
        if all.iter().any(String::is_empty) {
            return Err(ConfigurationError::TopologySchema {
                cluster: 0,
                message: "The 'all' topics cannot be empty strings".to_string(),
            });
        }

        if let Some(default) = &raw.default {
            if default.iter().any(String::is_empty) {
                return Err(ConfigurationError::TopologySchema {
                    cluster: 0,
                    message: "The 'default' topics cannot be empty strings".to_string(),
                });
            }
        }

        Ok(TopicTopology {
            clusters,
            all,
            default: raw.default,
        })
    }
}
