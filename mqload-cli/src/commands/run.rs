// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `mqload run` command - Drive one load run and report it.

use anyhow::{bail, Context};
use mqload_core::{
    ConfigLoader, DelayLog, JsonReporter, MqttConnector, RunReport, RunSummary, WorkerPool,
};

use crate::args::{HarnessArgs, OutputArgs};

pub async fn execute(harness: &HarnessArgs, output: &OutputArgs) -> anyhow::Result<()> {
    let plan = ConfigLoader::build(harness.to_raw()).context("Invalid configuration")?;

    let Some(first) = plan.workers.first() else {
        bail!("Nothing to run: no publisher or subscriber workers were planned");
    };
    let connector = MqttConnector::for_endpoint(&first.endpoint)?;

    tracing::info!(
        run_id = %plan.run_id,
        broker = %plan.parameters.broker,
        "Run planned"
    );

    let pool = WorkerPool::new(connector);
    let outcome = pool.run(plan.workers.clone(), plan.run_timeout).await?;

    let summary = RunSummary::new(&plan, &outcome);
    if summary.deficit() > 0 {
        tracing::warn!(deficit = summary.deficit(), "Run degraded: some workers did not complete");
    }

    if output.brief {
        println!("{}", summary.render_brief());
    } else {
        print!("{summary}");
    }

    // A failed log write still leaves the summary and the report
    match DelayLog::write(
        &output.log_dir,
        &output.description,
        &plan.parameters.origin_host,
        &outcome.records,
    ) {
        Ok(path) => {
            tracing::info!(path = %path.display(), records = outcome.records.len(), "Delay log written");
        }
        Err(e) => {
            tracing::warn!(dir = %output.log_dir.display(), error = %e, "Could not write delay log");
        }
    }

    if let Some(dir) = &output.report_dir {
        let reporter = JsonReporter::new(dir)?;
        let report = RunReport::new(&output.description, &plan, &outcome);
        let path = reporter.save(&report)?;
        tracing::info!(path = %path.display(), "Run report saved");
    }

    Ok(())
}
