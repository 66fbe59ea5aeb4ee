//! Cluster control interface.
//!
//! The thrasher and the health pollers talk to the cluster only through the
//! [`ClusterControl`] trait. Three implementations ship with the crate:
//!
//! - [`NoopCluster`]: mutations do nothing, queries return canned values
//! - [`SimCluster`]: in-memory model that applies every mutation and keeps
//!   an operation log, for tests and dry runs
//! - [`CliCluster`]: drives a real cluster through its command-line tool and
//!   a daemon lifecycle backend
//!
//! Every call may block on a remote round trip. Failures are returned as-is
//! and never retried here.

mod cli;
mod noop;
mod runner;
mod sim;

pub use cli::{CliCluster, CommandRunner, DaemonControl};
pub use noop::NoopCluster;
pub use runner::{LocalRunner, ShellDaemonControl};
pub use sim::{ClusterOp, SimCluster};

use crate::error::Result;
use crate::types::{MembershipSnapshot, MonRank, OsdId, PgCounts, TimeCheck};
use std::collections::BTreeSet;

/// Introspection and mutation of a running storage cluster.
#[async_trait::async_trait]
pub trait ClusterControl: Send + Sync {
    /// Admission and liveness of every osd.
    async fn membership_snapshot(&self) -> Result<MembershipSnapshot>;

    /// Placement group state counts.
    async fn pg_counts(&self) -> Result<PgCounts>;

    /// Whether every placement group is active+clean.
    async fn is_clean(&self) -> Result<bool> {
        Ok(self.pg_counts().await?.is_clean())
    }

    /// Ranks of the monitors currently in quorum.
    async fn mon_quorum(&self) -> Result<BTreeSet<MonRank>>;

    /// Whether the cluster map reports the osd as up.
    async fn is_osd_up(&self, osd: OsdId) -> Result<bool>;

    /// Latest monitor time-check results.
    async fn mon_timechecks(&self) -> Result<Vec<TimeCheck>>;

    /// Objects the cluster reports as unfound.
    async fn num_unfound_objects(&self) -> Result<u64>;

    /// Stop the osd process.
    async fn stop_osd(&self, osd: OsdId) -> Result<()>;

    /// Restart the osd process.
    async fn restart_osd(&self, osd: OsdId) -> Result<()>;

    /// Admit the osd to data placement.
    async fn mark_in(&self, osd: OsdId) -> Result<()>;

    /// Exclude the osd from data placement.
    async fn mark_out(&self, osd: OsdId) -> Result<()>;

    /// Mark the osd down in the cluster map without touching its process.
    async fn mark_down_osd(&self, osd: OsdId) -> Result<()>;

    /// Make the osd's I/O hang silently.
    async fn enable_blackhole(&self, osd: OsdId) -> Result<()>;

    /// Stop the monitors from marking down osds out on their own.
    async fn disable_auto_eviction(&self) -> Result<()>;

    /// Stop the named monitor's process.
    async fn stop_mon(&self, mon: &str) -> Result<()>;

    /// Restart the named monitor's process.
    async fn restart_mon(&self, mon: &str) -> Result<()>;
}
