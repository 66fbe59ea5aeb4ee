//! In-memory cluster model.
//!
//! Tracks admission and liveness per osd, applies every mutation the
//! thrasher issues and records it in an operation log. Placement group
//! counts, quorum and time checks are scripted by the caller.
//!
//! Monitors are named by their rank (`"0"`, `"1"`, ...). Stopping one drops
//! it from the quorum and restarting it brings it back.

use super::ClusterControl;
use crate::error::{Result, ThrashError};
use crate::types::{MembershipSnapshot, MonRank, OsdId, PgCounts, TimeCheck};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tokio::sync::RwLock;

/// A mutation received by the simulated cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterOp {
    Stop(OsdId),
    Restart(OsdId),
    MarkIn(OsdId),
    MarkOut(OsdId),
    Blackhole(OsdId),
    MarkDown(OsdId),
    DisableAutoEviction,
    StopMon(MonRank),
    RestartMon(MonRank),
}

#[derive(Debug, Clone, Copy)]
struct SimOsd {
    admitted: bool,
    running: bool,
    blackholed: bool,
    /// Marked down in the map while the process may still run.
    marked_down: bool,
}

impl SimOsd {
    fn new(admitted: bool, running: bool) -> Self {
        Self {
            admitted,
            running,
            blackholed: false,
            marked_down: false,
        }
    }
}

#[derive(Debug)]
struct SimState {
    osds: BTreeMap<OsdId, SimOsd>,
    pg_total: u64,
    /// Consumed one per query; the last entry sticks.
    pg_script: VecDeque<PgCounts>,
    mons: BTreeSet<MonRank>,
    quorum: BTreeSet<MonRank>,
    timechecks: Vec<TimeCheck>,
    unfound: u64,
    snapshot_override: Option<MembershipSnapshot>,
    fail_next_mutation: Option<String>,
    auto_eviction: bool,
    ops: Vec<ClusterOp>,
}

/// Simulated cluster.
pub struct SimCluster {
    state: RwLock<SimState>,
}

impl SimCluster {
    /// Cluster with osds `0..osds`, all in and running, and `mons` monitors
    /// in quorum.
    pub fn new(osds: u32, mons: u32) -> Self {
        let osds = (0..osds).map(|id| (id, SimOsd::new(true, true))).collect();
        let mons: BTreeSet<MonRank> = (0..mons).collect();

        Self {
            state: RwLock::new(SimState {
                osds,
                pg_total: 64,
                pg_script: VecDeque::new(),
                quorum: mons.clone(),
                mons,
                timechecks: Vec::new(),
                unfound: 0,
                snapshot_override: None,
                fail_next_mutation: None,
                auto_eviction: true,
                ops: Vec::new(),
            }),
        }
    }

    /// Queue placement group counts returned by successive queries.
    pub async fn script_pg_counts(&self, counts: impl IntoIterator<Item = PgCounts>) {
        self.state.write().await.pg_script.extend(counts);
    }

    pub async fn set_quorum(&self, quorum: impl IntoIterator<Item = MonRank>) {
        self.state.write().await.quorum = quorum.into_iter().collect();
    }

    pub async fn set_timechecks(&self, timechecks: Vec<TimeCheck>) {
        self.state.write().await.timechecks = timechecks;
    }

    pub async fn set_unfound_objects(&self, unfound: u64) {
        self.state.write().await.unfound = unfound;
    }

    /// Report this snapshot instead of the modelled membership.
    pub async fn override_snapshot(&self, snapshot: MembershipSnapshot) {
        self.state.write().await.snapshot_override = Some(snapshot);
    }

    /// Make the next mutation fail with a command error.
    pub async fn fail_next_mutation(&self, reason: impl Into<String>) {
        self.state.write().await.fail_next_mutation = Some(reason.into());
    }

    /// Set an osd's state directly, bypassing the operation log.
    pub async fn set_osd(&self, osd: OsdId, admitted: bool, running: bool) {
        self.state
            .write()
            .await
            .osds
            .insert(osd, SimOsd::new(admitted, running));
    }

    /// Every mutation received so far, in order.
    pub async fn ops(&self) -> Vec<ClusterOp> {
        self.state.read().await.ops.clone()
    }

    pub async fn auto_eviction_enabled(&self) -> bool {
        self.state.read().await.auto_eviction
    }

    pub async fn is_blackholed(&self, osd: OsdId) -> bool {
        self.state
            .read()
            .await
            .osds
            .get(&osd)
            .map(|o| o.blackholed)
            .unwrap_or(false)
    }

    async fn mutate<F>(&self, op: ClusterOp, apply: F) -> Result<()>
    where
        F: FnOnce(&mut SimState) -> Result<()>,
    {
        tokio::task::yield_now().await;
        let mut state = self.state.write().await;
        if let Some(reason) = state.fail_next_mutation.take() {
            return Err(ThrashError::Command {
                command: format!("{:?}", op),
                status: 1,
                stderr: reason,
            });
        }
        apply(&mut state)?;
        state.ops.push(op);
        Ok(())
    }
}

fn osd_mut(state: &mut SimState, osd: OsdId) -> Result<&mut SimOsd> {
    state.osds.get_mut(&osd).ok_or(ThrashError::UnknownOsd(osd))
}

fn mon_rank(mons: &BTreeSet<MonRank>, mon: &str) -> Result<MonRank> {
    mon.parse::<MonRank>()
        .ok()
        .filter(|rank| mons.contains(rank))
        .ok_or_else(|| ThrashError::UnknownMon(mon.to_string()))
}

#[async_trait::async_trait]
impl ClusterControl for SimCluster {
    async fn membership_snapshot(&self) -> Result<MembershipSnapshot> {
        tokio::task::yield_now().await;
        let state = self.state.read().await;
        if let Some(snapshot) = &state.snapshot_override {
            return Ok(snapshot.clone());
        }

        let mut snapshot = MembershipSnapshot::default();
        for (&id, osd) in &state.osds {
            if osd.admitted {
                snapshot.in_osds.insert(id);
            } else {
                snapshot.out_osds.insert(id);
            }
            if osd.running {
                snapshot.live_osds.insert(id);
            } else {
                snapshot.dead_osds.insert(id);
            }
        }
        Ok(snapshot)
    }

    async fn pg_counts(&self) -> Result<PgCounts> {
        tokio::task::yield_now().await;
        let mut state = self.state.write().await;
        let counts = if state.pg_script.len() > 1 {
            state.pg_script.pop_front()
        } else {
            state.pg_script.front().copied()
        };
        Ok(counts.unwrap_or(PgCounts {
            total: state.pg_total,
            active_clean: state.pg_total,
            active: state.pg_total,
        }))
    }

    /// Judges the next scripted counts without consuming them.
    async fn is_clean(&self) -> Result<bool> {
        tokio::task::yield_now().await;
        let state = self.state.read().await;
        Ok(state
            .pg_script
            .front()
            .map_or(true, |counts| counts.is_clean()))
    }

    async fn mon_quorum(&self) -> Result<BTreeSet<MonRank>> {
        tokio::task::yield_now().await;
        Ok(self.state.read().await.quorum.clone())
    }

    async fn is_osd_up(&self, osd: OsdId) -> Result<bool> {
        tokio::task::yield_now().await;
        let state = self.state.read().await;
        state
            .osds
            .get(&osd)
            .map(|o| o.running && !o.marked_down)
            .ok_or(ThrashError::UnknownOsd(osd))
    }

    async fn mon_timechecks(&self) -> Result<Vec<TimeCheck>> {
        tokio::task::yield_now().await;
        Ok(self.state.read().await.timechecks.clone())
    }

    async fn num_unfound_objects(&self) -> Result<u64> {
        tokio::task::yield_now().await;
        Ok(self.state.read().await.unfound)
    }

    async fn stop_osd(&self, osd: OsdId) -> Result<()> {
        self.mutate(ClusterOp::Stop(osd), |s| {
            osd_mut(s, osd)?.running = false;
            Ok(())
        })
        .await
    }

    async fn restart_osd(&self, osd: OsdId) -> Result<()> {
        self.mutate(ClusterOp::Restart(osd), |s| {
            let entry = osd_mut(s, osd)?;
            entry.running = true;
            entry.blackholed = false;
            entry.marked_down = false;
            Ok(())
        })
        .await
    }

    async fn mark_in(&self, osd: OsdId) -> Result<()> {
        self.mutate(ClusterOp::MarkIn(osd), |s| {
            osd_mut(s, osd)?.admitted = true;
            Ok(())
        })
        .await
    }

    async fn mark_out(&self, osd: OsdId) -> Result<()> {
        self.mutate(ClusterOp::MarkOut(osd), |s| {
            osd_mut(s, osd)?.admitted = false;
            Ok(())
        })
        .await
    }

    async fn mark_down_osd(&self, osd: OsdId) -> Result<()> {
        self.mutate(ClusterOp::MarkDown(osd), |s| {
            osd_mut(s, osd)?.marked_down = true;
            Ok(())
        })
        .await
    }

    async fn enable_blackhole(&self, osd: OsdId) -> Result<()> {
        self.mutate(ClusterOp::Blackhole(osd), |s| {
            osd_mut(s, osd)?.blackholed = true;
            Ok(())
        })
        .await
    }

    async fn disable_auto_eviction(&self) -> Result<()> {
        self.mutate(ClusterOp::DisableAutoEviction, |s| {
            s.auto_eviction = false;
            Ok(())
        })
        .await
    }

    async fn stop_mon(&self, mon: &str) -> Result<()> {
        let rank = mon_rank(&self.state.read().await.mons, mon)?;
        self.mutate(ClusterOp::StopMon(rank), |s| {
            s.quorum.remove(&rank);
            Ok(())
        })
        .await
    }

    async fn restart_mon(&self, mon: &str) -> Result<()> {
        let rank = mon_rank(&self.state.read().await.mons, mon)?;
        self.mutate(ClusterOp::RestartMon(rank), |s| {
            s.quorum.insert(rank);
            Ok(())
        })
        .await
    }
}
