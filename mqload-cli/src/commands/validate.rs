// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `mqload validate` command - Resolve options and print the worker plan.

use mqload_core::{ConfigLoader, Role};

use crate::args::HarnessArgs;

pub fn execute(args: &HarnessArgs) -> anyhow::Result<()> {
    tracing::info!("Validating configuration");

    match ConfigLoader::build(args.to_raw()) {
        Ok(plan) => {
            let params = &plan.parameters;
            println!("✓ Configuration is valid");
            println!();
            println!("Run Settings:");
            println!("  Broker:           {}", params.broker);
            println!("  TLS:              {}", if params.tls { "yes" } else { "no" });
            println!("  QoS:              {}", params.qos);
            println!("  Message Size:     {} bytes", params.message_size);
            println!("  Delay:            {}ms", params.delay_ms);
            println!(
                "  Timeouts:         sub {}s, pub {}s, idle {}s, run {}s",
                params.sub_timeout_secs,
                params.pub_timeout_secs,
                params.idle_timeout_secs,
                params.run_timeout_secs
            );
            println!("  Origin Host:      {}", params.origin_host);

            for role in [Role::Subscriber, Role::Publisher] {
                println!();
                println!("{} workers ({}):", role, plan.spawned(role));
                for worker in plan.workers_of(role) {
                    println!(
                        "  - {} (client id: {}, topics: {}, messages: {})",
                        worker.id, worker.client_id, worker.topics, worker.message_count
                    );
                }
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
