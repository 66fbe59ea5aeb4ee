//! Cluster driven through its command-line tool.

use super::ClusterControl;
use crate::error::{Result, ThrashError};
use crate::types::{DaemonRole, MembershipSnapshot, MonRank, OsdId, PgCounts, TimeCheck};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Pause between enabling the blackhole and stopping the daemon, so that
/// in-flight I/O actually hits it.
const BLACKHOLE_SETTLE: Duration = Duration::from_secs(2);

/// Runs cluster-tool commands and returns their standard output.
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, args: &[String]) -> Result<String>;
}

/// Starts, stops and inspects daemon processes.
#[async_trait::async_trait]
pub trait DaemonControl: Send + Sync {
    async fn stop(&self, role: DaemonRole, id: &str) -> Result<()>;

    async fn restart(&self, role: DaemonRole, id: &str) -> Result<()>;

    async fn is_running(&self, role: DaemonRole, id: &str) -> Result<bool>;
}

#[derive(Debug, Deserialize)]
struct OsdDump {
    osds: Vec<OsdDumpEntry>,
}

#[derive(Debug, Deserialize)]
struct OsdDumpEntry {
    osd: OsdId,
    up: u8,
    #[serde(rename = "in")]
    admitted: u8,
}

#[derive(Debug, Deserialize)]
struct PgDump {
    pg_stats: Vec<PgStat>,
}

#[derive(Debug, Deserialize)]
struct PgStat {
    state: String,
}

#[derive(Debug, Deserialize)]
struct QuorumStatus {
    quorum: BTreeSet<MonRank>,
}

#[derive(Debug, Deserialize)]
struct HealthDetail {
    #[serde(default)]
    timechecks: Vec<TimeCheck>,
}

/// [`ClusterControl`] backed by the cluster tool and a daemon backend.
pub struct CliCluster {
    runner: Arc<dyn CommandRunner>,
    daemons: Arc<dyn DaemonControl>,
}

impl CliCluster {
    pub fn new(runner: Arc<dyn CommandRunner>, daemons: Arc<dyn DaemonControl>) -> Self {
        Self { runner, daemons }
    }

    async fn command(&self, args: &[&str]) -> Result<String> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        debug!(?args, "cluster command");
        self.runner.run(&args).await
    }

    async fn command_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        let out = self.command(args).await?;
        parse_json(&out)
    }

    async fn osd_dump(&self) -> Result<Vec<OsdDumpEntry>> {
        let dump: OsdDump = self
            .command_json(&["--", "osd", "dump", "--format=json"])
            .await?;
        Ok(dump.osds)
    }
}

/// Parse JSON that may be preceded by banner or warning lines.
///
/// The payload starts on the first line that opens with `{` or `[` and
/// parses through to the end of the output. Earlier candidates that fail to
/// parse, such as a `[WRN]` line, are skipped.
fn parse_json<T: DeserializeOwned>(out: &str) -> Result<T> {
    let mut offset = 0;
    let mut last_err = None;
    for line in out.split_inclusive('\n') {
        let start = offset + (line.len() - line.trim_start().len());
        offset += line.len();
        if !line.trim_start().starts_with(['{', '[']) {
            continue;
        }
        match serde_json::from_str(&out[start..]) {
            Ok(value) => return Ok(value),
            Err(e) => last_err = Some(e),
        }
    }
    match last_err {
        Some(e) => Err(e.into()),
        None => Err(ThrashError::Parse(format!("no JSON in output: {:?}", out))),
    }
}

/// Count of unfound objects in plain `status` output, from the first
/// `<unfound>/<total> unfound` figure. Zero when none is reported.
fn parse_unfound(status: &str) -> Result<u64> {
    let words: Vec<&str> = status.split_whitespace().collect();
    for pair in words.windows(2) {
        if !pair[1].starts_with("unfound") {
            continue;
        }
        let figure = pair[0].trim_start_matches(|c: char| !c.is_ascii_digit());
        if let Some((unfound, total)) = figure.split_once('/') {
            if total.chars().all(|c| c.is_ascii_digit()) && !total.is_empty() {
                return unfound
                    .parse()
                    .map_err(|e| ThrashError::Parse(format!("unfound count {:?}: {}", unfound, e)));
            }
        }
    }
    Ok(0)
}

#[async_trait::async_trait]
impl ClusterControl for CliCluster {
    async fn membership_snapshot(&self) -> Result<MembershipSnapshot> {
        let mut snapshot = MembershipSnapshot::default();
        for entry in self.osd_dump().await? {
            if entry.admitted > 0 {
                snapshot.in_osds.insert(entry.osd);
            } else {
                snapshot.out_osds.insert(entry.osd);
            }

            let running = self
                .daemons
                .is_running(DaemonRole::Osd, &entry.osd.to_string())
                .await?;
            if running {
                snapshot.live_osds.insert(entry.osd);
            } else {
                snapshot.dead_osds.insert(entry.osd);
            }
        }
        Ok(snapshot)
    }

    async fn pg_counts(&self) -> Result<PgCounts> {
        let dump: PgDump = self
            .command_json(&["--", "pg", "dump", "--format=json"])
            .await?;

        let mut counts = PgCounts {
            total: dump.pg_stats.len() as u64,
            ..Default::default()
        };
        for pg in &dump.pg_stats {
            if pg.state.starts_with("active") {
                counts.active += 1;
            }
            if pg.state.starts_with("active+clean") {
                counts.active_clean += 1;
            }
        }
        Ok(counts)
    }

    async fn mon_quorum(&self) -> Result<BTreeSet<MonRank>> {
        let status: QuorumStatus = self.command_json(&["quorum_status"]).await?;
        Ok(status.quorum)
    }

    async fn is_osd_up(&self, osd: OsdId) -> Result<bool> {
        self.osd_dump()
            .await?
            .into_iter()
            .find(|e| e.osd == osd)
            .map(|e| e.up > 0)
            .ok_or(ThrashError::UnknownOsd(osd))
    }

    async fn mon_timechecks(&self) -> Result<Vec<TimeCheck>> {
        let detail: HealthDetail = self
            .command_json(&["health", "detail", "--format=json"])
            .await?;
        Ok(detail.timechecks)
    }

    async fn num_unfound_objects(&self) -> Result<u64> {
        let status = self.command(&["-s"]).await?;
        parse_unfound(&status)
    }

    async fn stop_osd(&self, osd: OsdId) -> Result<()> {
        self.daemons.stop(DaemonRole::Osd, &osd.to_string()).await
    }

    async fn restart_osd(&self, osd: OsdId) -> Result<()> {
        self.daemons.restart(DaemonRole::Osd, &osd.to_string()).await
    }

    async fn mark_in(&self, osd: OsdId) -> Result<()> {
        self.command(&["osd", "in", &osd.to_string()]).await?;
        Ok(())
    }

    async fn mark_out(&self, osd: OsdId) -> Result<()> {
        self.command(&["osd", "out", &osd.to_string()]).await?;
        Ok(())
    }

    async fn mark_down_osd(&self, osd: OsdId) -> Result<()> {
        self.command(&["osd", "down", &osd.to_string()]).await?;
        Ok(())
    }

    async fn enable_blackhole(&self, osd: OsdId) -> Result<()> {
        let target = format!("osd.{}", osd);
        self.command(&["--", "tell", &target, "injectargs", "--filestore-blackhole"])
            .await?;
        tokio::time::sleep(BLACKHOLE_SETTLE).await;
        Ok(())
    }

    async fn disable_auto_eviction(&self) -> Result<()> {
        info!("Disabling mon down-out interval");
        self.command(&[
            "mon",
            "tell",
            "*",
            "injectargs",
            "--mon-osd-down-out-interval",
            "0",
        ])
        .await?;
        Ok(())
    }

    async fn stop_mon(&self, mon: &str) -> Result<()> {
        self.daemons.stop(DaemonRole::Mon, mon).await
    }

    async fn restart_mon(&self, mon: &str) -> Result<()> {
        self.daemons.restart(DaemonRole::Mon, mon).await
    }
}
