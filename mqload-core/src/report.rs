// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Run output: the per-message delay log, the console summary and the
//! optional JSON run report.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sysinfo::System;
use uuid::Uuid;

use crate::aggregator::{DelayRecord, DelayStats, RoleSummary};
use crate::config::{PlanParameters, RunPlan};
use crate::error::ReportError;
use crate::pool::RunOutcome;
use crate::types::Role;

/// Header line of the delay log.
pub const DELAY_LOG_HEADER: &str = "pub_client_id;hostname_origin;sending_timestamp;sub_client;hostname_destination;arrival_timestamp;e2e_delay";

/// Semicolon-separated log with one row per received message.
pub struct DelayLog;

impl DelayLog {
    /// `{dir}/{description}_log_{suffix}.csv`, where the suffix is the last
    /// octet of an IPv4 client host, or the host name itself.
    pub fn path_for(dir: impl AsRef<Path>, description: &str, client_host: &str) -> PathBuf {
        let suffix = match client_host.parse::<Ipv4Addr>() {
            Ok(ip) => ip.octets()[3].to_string(),
            Err(_) => client_host.to_string(),
        };
        dir.as_ref()
            .join(format!("{}_log_{}.csv", description, suffix))
    }

    /// Write the header and every record; returns the file path.
    pub fn write(
        dir: impl AsRef<Path>,
        description: &str,
        client_host: &str,
        records: &[DelayRecord],
    ) -> Result<PathBuf, ReportError> {
        fs::create_dir_all(dir.as_ref())?;
        let path = Self::path_for(dir, description, client_host);

        let mut writer = BufWriter::new(File::create(&path)?);
        writeln!(writer, "{}", DELAY_LOG_HEADER)?;
        for record in records {
            writeln!(
                writer,
                "{};{};{};{};{};{};{}",
                record.publisher_id,
                record.origin_host,
                record.sent_at,
                record.subscriber_id,
                record.destination_host,
                record.arrived_at,
                record.e2e_delay_micros,
            )?;
        }
        writer.flush()?;

        Ok(path)
    }
}

/// Final figures of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Configured subscriber clients.
    pub sub_clients: usize,
    /// Configured publisher clients.
    pub pub_clients: usize,
    pub subscribers: RoleSummary,
    pub publishers: RoleSummary,
    pub delays: DelayStats,
    pub deadline_hit: bool,
}

impl RunSummary {
    pub fn new(plan: &RunPlan, outcome: &RunOutcome) -> Self {
        Self {
            sub_clients: plan.parameters.sub_clients,
            pub_clients: plan.parameters.pub_clients,
            subscribers: outcome.summary(Role::Subscriber, plan.message_count(Role::Subscriber)),
            publishers: outcome.summary(Role::Publisher, plan.message_count(Role::Publisher)),
            delays: outcome.delay_stats(),
            deadline_hit: outcome.deadline_hit,
        }
    }

    /// Workers without a successful sample, across both roles.
    pub fn deficit(&self) -> usize {
        self.subscribers.deficit() + self.publishers.deficit()
    }

    /// One line: `sub_clients;pub_clients;sub_mean;sub_std;sub_avg_thpt;
    /// sub_total_thpt;pub_mean;pub_std;pub_avg_thpt;pub_total_thpt`.
    pub fn render_brief(&self) -> String {
        let s = &self.subscribers.aggregate;
        let p = &self.publishers.aggregate;
        format!(
            "{};{};{};{};{};{};{};{};{};{}",
            self.sub_clients,
            self.pub_clients,
            s.mean,
            s.std_dev,
            s.avg_throughput,
            s.total_throughput,
            p.mean,
            p.std_dev,
            p.avg_throughput,
            p.total_throughput,
        )
    }
}

/// Multi-line report for humans.
impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const RULE: &str =
            "================================================================================";

        writeln!(
            f,
            "[ran with {} subscribers and {} publishers]",
            self.sub_clients, self.pub_clients
        )?;

        for (title, noun, label, short, summary) in [
            ("Subscription Results", "subscriber", "Subscriber", "sub", &self.subscribers),
            ("Publisher Results", "publisher", "Publisher", "pub", &self.publishers),
        ] {
            let a = &summary.aggregate;
            writeln!(f, "{RULE}\n{title}\n{RULE}")?;
            writeln!(f, "Avg. {} duration: {:.6} s", noun, a.mean)?;
            writeln!(f, "{} duration std dev: {:.6} s", label, a.std_dev)?;
            writeln!(f, "Avg. Client Throughput: {:.3} msg/s", a.avg_throughput)?;
            writeln!(
                f,
                "Total Throughput (msg_count * clients) / (avg. {} time): {:.3} msg/s",
                short, a.total_throughput
            )?;
            writeln!(
                f,
                "Completed workers: {}/{} ({} messages)",
                summary.completed, summary.expected, summary.messages
            )?;
            if summary.is_degraded() {
                writeln!(f, "{} {} workers failed", summary.deficit(), noun)?;
                for entry in &summary.failures {
                    writeln!(f, "  {}: {}", entry.worker_id, entry.failure)?;
                }
            }
        }

        let ms = |micros: i64| micros as f64 / 1000.0;
        let d = &self.delays;
        writeln!(f, "{RULE}\nEnd-to-end Delay\n{RULE}")?;
        writeln!(f, "Messages with delay: {}", d.count)?;
        writeln!(f, "Mean delay: {:.3} ms", d.mean_micros / 1000.0)?;
        writeln!(f, "Delay std dev: {:.3} ms", d.std_dev_micros / 1000.0)?;
        writeln!(
            f,
            "Min / max delay: {:.3} / {:.3} ms",
            ms(d.min_micros),
            ms(d.max_micros)
        )?;
        writeln!(
            f,
            "p50 / p95 / p99 delay: {:.3} / {:.3} / {:.3} ms",
            ms(d.p50_micros),
            ms(d.p95_micros),
            ms(d.p99_micros)
        )?;

        if self.deadline_hit {
            writeln!(f, "Run deadline reached; unfinished workers were cancelled")?;
        }

        Ok(())
    }
}

/// Load generator host information captured with each report.
#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub os: String,
    pub os_version: String,
    pub kernel_version: Option<String>,
    pub cpu_model: String,
    pub cpu_cores: usize,
    pub memory_bytes: u64,
    pub hostname: String,
}

impl SystemInfo {
    /// Collect current system information.
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu();
        sys.refresh_memory();

        Self {
            os: System::name().unwrap_or_else(|| "Unknown".to_string()),
            os_version: System::os_version().unwrap_or_else(|| "Unknown".to_string()),
            kernel_version: System::kernel_version(),
            cpu_model: sys
                .cpus()
                .first()
                .map(|cpu| cpu.brand().to_string())
                .unwrap_or_else(|| "Unknown".to_string()),
            cpu_cores: sys.cpus().len(),
            memory_bytes: sys.total_memory(),
            hostname: local_hostname(),
        }
    }
}

/// Host name of the machine running the harness.
pub fn local_hostname() -> String {
    System::host_name().unwrap_or_else(|| "localhost".to_string())
}

/// Complete JSON run report.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub tool: String,
    pub version: String,
    pub run_id: Uuid,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub system_info: SystemInfo,
    pub parameters: PlanParameters,
    pub elapsed_secs: f64,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn new(description: &str, plan: &RunPlan, outcome: &RunOutcome) -> Self {
        Self {
            tool: "mqload".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            run_id: plan.run_id,
            description: description.to_string(),
            timestamp: Utc::now(),
            system_info: SystemInfo::collect(),
            parameters: plan.parameters.clone(),
            elapsed_secs: outcome.elapsed.as_secs_f64(),
            summary: RunSummary::new(plan, outcome),
        }
    }
}

/// Writes run reports to timestamped JSON files.
pub struct JsonReporter {
    output_dir: PathBuf,
}

impl JsonReporter {
    /// Create a reporter, creating the output directory if needed.
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self, ReportError> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    /// Save a report; returns the path of the created file.
    pub fn save(&self, report: &RunReport) -> Result<PathBuf, ReportError> {
        let timestamp = report.timestamp.format("%Y-%m-%dT%H-%M-%SZ");
        let filename = format!("{}_{}.json", report.description, timestamp);
        let filepath = self.output_dir.join(filename);

        let writer = BufWriter::new(File::create(&filepath)?);
        serde_json::to_writer_pretty(writer, report)?;

        Ok(filepath)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    use crate::aggregator::Sample;
    use crate::config::{ConfigLoader, RawHarnessConfig};
    use crate::error::WorkerFailure;
    use crate::types::{Timestamp, WorkerId};

    fn plan() -> RunPlan {
        ConfigLoader::build(RawHarnessConfig {
            hostname: Some("broker".to_string()),
            pub_clients: 2,
            sub_clients: 1,
            pub_count: 10,
            sub_count: 20,
            topic: Some("t".to_string()),
            client_host: "10.0.1.7".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    fn outcome() -> RunOutcome {
        let id = |s: &str| WorkerId::new(s).unwrap();
        RunOutcome {
            samples: vec![
                Sample::completed(id("sub0"), Role::Subscriber, 20, Duration::from_secs(2))
                    .with_delays(vec![1_000, 3_000]),
                Sample::completed(id("pub0"), Role::Publisher, 10, Duration::from_secs(1)),
                Sample::failed(
                    id("pub1"),
                    Role::Publisher,
                    0,
                    WorkerFailure::ConnectionFailure {
                        reason: "refused".to_string(),
                    },
                ),
            ],
            records: Vec::new(),
            spawned_publishers: 2,
            spawned_subscribers: 1,
            elapsed: Duration::from_secs(3),
            deadline_hit: false,
        }
    }

    #[test]
    fn test_log_path_suffix() {
        assert_eq!(
            DelayLog::path_for("logs", "run", "192.168.1.42"),
            PathBuf::from("logs/run_log_42.csv")
        );
        assert_eq!(
            DelayLog::path_for("logs", "run", "bench-host"),
            PathBuf::from("logs/run_log_bench-host.csv")
        );
    }

    #[test]
    fn test_delay_log_contents() {
        let dir = TempDir::new().unwrap();
        let records = vec![DelayRecord {
            publisher_id: "pub0".to_string(),
            origin_host: "10.0.1.7".to_string(),
            sent_at: Timestamp::from_micros(1_000),
            subscriber_id: WorkerId::new("sub0").unwrap(),
            destination_host: "10.0.1.8".to_string(),
            arrived_at: Timestamp::from_micros(1_250),
            e2e_delay_micros: 250,
        }];

        let path = DelayLog::write(dir.path(), "exp1", "10.0.1.8", &records).unwrap();
        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines[0], DELAY_LOG_HEADER);
        assert_eq!(lines[1], "pub0;10.0.1.7;1000;sub0;10.0.1.8;1250;250");
    }

    #[test]
    fn test_brief_summary() {
        let summary = RunSummary::new(&plan(), &outcome());
        let brief = summary.render_brief();
        let fields: Vec<&str> = brief.split(';').collect();

        assert_eq!(fields.len(), 10);
        assert_eq!(fields[0], "1");
        assert_eq!(fields[1], "2");
        assert_eq!(fields[2], "2");
        // 20 messages over a 2 s mean
        assert_eq!(fields[4], "10");
        assert_eq!(summary.deficit(), 1);
    }

    #[test]
    fn test_human_summary_reports_failures() {
        let text = RunSummary::new(&plan(), &outcome()).to_string();
        assert!(text.starts_with("[ran with 1 subscribers and 2 publishers]"));
        assert!(text.contains("Subscription Results"));
        assert!(text.contains("1 publisher workers failed"));
        assert!(text.contains("pub1: connection failure: refused"));
        assert!(text.contains("Messages with delay: 2"));
        // Delays of 1 ms and 3 ms
        assert!(text.contains("Min / max delay: 1.000 / 3.000 ms"));
        assert!(text.contains("p50 / p95 / p99 delay: 3.000 / 3.000 / 3.000 ms"));
        assert!(!text.contains("Run deadline reached"));
    }

    #[test]
    fn test_json_report_saved() {
        let dir = TempDir::new().unwrap();
        let reporter = JsonReporter::new(dir.path().join("reports")).unwrap();
        let report = RunReport::new("exp1", &plan(), &outcome());

        let path = reporter.save(&report).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();

        assert_eq!(value["tool"], "mqload");
        assert_eq!(value["summary"]["publishers"]["completed"], 1);
        assert_eq!(value["parameters"]["pub_count"], 10);
    }
}
