// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Harness options shared by `run` and `validate`.
//!
//! Every option resolves from the command line first, then from its
//! `CLIENT_*` environment variable, then from the default.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use mqload_core::config::{DEFAULT_MESSAGE_SIZE, RawHarnessConfig};
use mqload_core::report::local_hostname;

#[derive(Args, Debug, Clone)]
pub struct HarnessArgs {
    /// Broker host name or address
    #[arg(short = 'H', long, env = "CLIENT_HOSTNAME")]
    pub hostname: Option<String>,

    /// Broker port (1883, or 8883 with --cacert)
    #[arg(short = 'P', long, env = "CLIENT_PORT")]
    pub port: Option<u16>,

    /// Number of publisher clients
    #[arg(long, env = "CLIENT_PUBLISHERS", default_value_t = 0)]
    pub pub_clients: usize,

    /// Number of subscriber clients
    #[arg(long, env = "CLIENT_SUBSCRIBERS", default_value_t = 0)]
    pub sub_clients: usize,

    /// Messages each publisher sends
    #[arg(long, env = "CLIENT_PUBLISHERS_COUNT", default_value_t = 0)]
    pub pub_count: u64,

    /// Messages each subscriber expects
    #[arg(long, env = "CLIENT_SUBSCRIBERS_COUNT", default_value_t = 0)]
    pub sub_count: u64,

    /// Payload size in bytes
    #[arg(long = "msg-size", env = "CLIENT_MESSAGE_SIZE", default_value_t = DEFAULT_MESSAGE_SIZE)]
    pub message_size: usize,

    /// Quality of service (0, 1 or 2)
    #[arg(short, long, env = "CLIENT_QOS", default_value_t = 0)]
    pub qos: u8,

    /// Subscriber timeout in seconds
    #[arg(long, env = "CLIENT_SUBSCRIBERS_TIMEOUT", default_value_t = 60)]
    pub sub_timeout: u64,

    /// Publisher timeout in seconds
    #[arg(long, env = "CLIENT_PUBLISHERS_TIMEOUT", default_value_t = 60)]
    pub pub_timeout: u64,

    /// Seconds a subscriber waits for the next message
    #[arg(long, env = "CLIENT_IDLE_TIMEOUT", default_value_t = 120)]
    pub idle_timeout: u64,

    /// Pause between two publishes, in milliseconds
    #[arg(long, env = "CLIENT_DELAY_MS", default_value_t = 0)]
    pub delay_ms: u64,

    /// Hard limit for the whole run in seconds (default: sum of the timeouts)
    #[arg(long)]
    pub run_timeout: Option<u64>,

    /// Single topic used by every worker
    #[arg(short = 't', long, env = "CLIENT_TOPIC", conflicts_with = "multiple_topics")]
    pub topic: Option<String>,

    /// Topology description (JSON or YAML) assigning topics to workers
    #[arg(short = 'T', long, env = "CLIENT_MULTIPLE_TOPICS")]
    pub multiple_topics: Option<PathBuf>,

    #[arg(short = 'u', long, env = "CLIENT_USERNAME")]
    pub username: Option<String>,

    #[arg(short = 'p', long, env = "CLIENT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// CA certificate; enables TLS
    #[arg(short = 'F', long, env = "CLIENT_CACERT")]
    pub cacert: Option<PathBuf>,

    /// Name of this load generator, embedded in every message
    #[arg(long = "origin", env = "CLIENT_ORIGIN", default_value_t = local_hostname())]
    pub client_host: String,
}

impl HarnessArgs {
    /// Hand the collected options to the core loader.
    pub fn to_raw(&self) -> RawHarnessConfig {
        RawHarnessConfig {
            hostname: self.hostname.clone(),
            port: self.port,
            pub_clients: self.pub_clients,
            sub_clients: self.sub_clients,
            pub_count: self.pub_count,
            sub_count: self.sub_count,
            message_size: self.message_size,
            qos: self.qos,
            sub_timeout: Duration::from_secs(self.sub_timeout),
            pub_timeout: Duration::from_secs(self.pub_timeout),
            idle_timeout: Duration::from_secs(self.idle_timeout),
            delay: Duration::from_millis(self.delay_ms),
            topic: self.topic.clone(),
            multiple_topics: self.multiple_topics.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            cacert: self.cacert.clone(),
            client_host: self.client_host.clone(),
            run_timeout: self.run_timeout.map(Duration::from_secs),
        }
    }
}

/// Output options of `run`.
#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Print the summary as one `;`-separated line
    #[arg(long, env = "CLIENT_BRIEF")]
    pub brief: bool,

    /// Run description used in output file names
    #[arg(short, long, env = "CLIENT_DESCRIPTION", default_value = "mqload")]
    pub description: String,

    /// Directory for the per-message delay log
    #[arg(long, default_value = "logs")]
    pub log_dir: PathBuf,

    /// Also write a JSON run report into this directory
    #[arg(long)]
    pub report_dir: Option<PathBuf>,
}
