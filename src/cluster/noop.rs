//! Cluster that accepts every command and changes nothing.

use super::ClusterControl;
use crate::error::Result;
use crate::types::{MembershipSnapshot, MonRank, OsdId, PgCounts, TimeCheck};
use std::collections::BTreeSet;
use tracing::debug;

/// No-op cluster for running harness code without a cluster.
///
/// Every osd is reported in and live, the cluster is always clean, every
/// osd is up and every monitor is in quorum. Mutations are logged and
/// dropped.
#[derive(Debug, Clone)]
pub struct NoopCluster {
    osds: BTreeSet<OsdId>,
    mons: usize,
}

impl NoopCluster {
    pub fn new(osds: impl IntoIterator<Item = OsdId>, mons: usize) -> Self {
        Self {
            osds: osds.into_iter().collect(),
            mons,
        }
    }
}

#[async_trait::async_trait]
impl ClusterControl for NoopCluster {
    async fn membership_snapshot(&self) -> Result<MembershipSnapshot> {
        Ok(MembershipSnapshot::all_up(self.osds.iter().copied()))
    }

    async fn pg_counts(&self) -> Result<PgCounts> {
        Ok(PgCounts::default())
    }

    async fn mon_quorum(&self) -> Result<BTreeSet<MonRank>> {
        Ok((0..self.mons as MonRank).collect())
    }

    async fn is_osd_up(&self, _osd: OsdId) -> Result<bool> {
        Ok(true)
    }

    async fn mon_timechecks(&self) -> Result<Vec<TimeCheck>> {
        Ok(Vec::new())
    }

    async fn num_unfound_objects(&self) -> Result<u64> {
        Ok(0)
    }

    async fn stop_osd(&self, osd: OsdId) -> Result<()> {
        debug!(osd, "noop: stop");
        Ok(())
    }

    async fn restart_osd(&self, osd: OsdId) -> Result<()> {
        debug!(osd, "noop: restart");
        Ok(())
    }

    async fn mark_in(&self, osd: OsdId) -> Result<()> {
        debug!(osd, "noop: mark in");
        Ok(())
    }

    async fn mark_out(&self, osd: OsdId) -> Result<()> {
        debug!(osd, "noop: mark out");
        Ok(())
    }

    async fn mark_down_osd(&self, osd: OsdId) -> Result<()> {
        debug!(osd, "noop: mark down");
        Ok(())
    }

    async fn enable_blackhole(&self, osd: OsdId) -> Result<()> {
        debug!(osd, "noop: blackhole");
        Ok(())
    }

    async fn disable_auto_eviction(&self) -> Result<()> {
        debug!("noop: disable auto eviction");
        Ok(())
    }

    async fn stop_mon(&self, mon: &str) -> Result<()> {
        debug!(mon, "noop: stop mon");
        Ok(())
    }

    async fn restart_mon(&self, mon: &str) -> Result<()> {
        debug!(mon, "noop: restart mon");
        Ok(())
    }
}
