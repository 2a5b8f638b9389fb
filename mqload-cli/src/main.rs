// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! mqload CLI
//!
//! Command-line interface for the MQTT broker load harness.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod args;
mod commands;

use args::{HarnessArgs, OutputArgs};

/// mqload - Concurrent MQTT publish/subscribe load generator
#[derive(Parser)]
#[command(name = "mqload")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run publishers and subscribers against a broker
    Run {
        #[command(flatten)]
        harness: HarnessArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Resolve the options and print the worker plan without connecting
    Validate {
        #[command(flatten)]
        harness: HarnessArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG takes precedence
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run { harness, output } => commands::run::execute(&harness, &output).await,
        Commands::Validate { harness } => commands::validate::execute(&harness),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_parses_short_flags() {
        let cli = Cli::try_parse_from([
            "mqload", "run", "-H", "broker.local", "-P", "1884", "-t", "bench/a", "-q", "1",
            "--pub-clients", "5", "--pub-count", "10", "--brief",
        ])
        .unwrap();

        match cli.command {
            Commands::Run { harness, output } => {
                assert_eq!(harness.hostname.as_deref(), Some("broker.local"));
                assert_eq!(harness.port, Some(1884));
                assert_eq!(harness.topic.as_deref(), Some("bench/a"));
                assert_eq!(harness.qos, 1);
                assert_eq!(harness.pub_clients, 5);
                assert_eq!(harness.pub_count, 10);
                assert!(output.brief);
                assert_eq!(output.description, "mqload");
            }
            Commands::Validate { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn test_topic_and_multiple_topics_conflict() {
        let result = Cli::try_parse_from([
            "mqload", "validate", "-H", "b", "-t", "x", "-T", "topology.json",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_raw_config_conversion() {
        let cli = Cli::try_parse_from([
            "mqload", "validate", "-H", "b", "-t", "x", "--sub-timeout", "5",
            "--delay-ms", "20", "--run-timeout", "30", "--origin", "10.0.0.7",
        ])
        .unwrap();

        let Commands::Validate { harness } = cli.command else {
            panic!("expected validate");
        };
        let raw = harness.to_raw();
        assert_eq!(raw.sub_timeout, std::time::Duration::from_secs(5));
        assert_eq!(raw.delay, std::time::Duration::from_millis(20));
        assert_eq!(raw.run_timeout, Some(std::time::Duration::from_secs(30)));
        assert_eq!(raw.client_host, "10.0.0.7");
    }

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::try_parse_from(["mqload", "validate", "-H", "b", "-t", "x", "-v"]).unwrap();
        assert!(cli.verbose);
    }
}
