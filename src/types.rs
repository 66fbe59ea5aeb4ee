//! Core type definitions shared by the thrasher, the cluster interface and
//! the health pollers.
//!
//! - [`OsdId`] = `u32`: storage daemon identifier
//! - [`MonRank`] = `u32`: position of a monitor in the quorum
//! - [`MembershipSnapshot`]: one observation of admission and liveness
//! - [`PgCounts`]: aggregated placement group states

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifier of a storage daemon.
pub type OsdId = u32;

/// Rank of a monitor in the quorum map.
pub type MonRank = u32;

/// Daemon roles the harness knows how to manage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonRole {
    Osd,
    Mon,
}

impl DaemonRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            DaemonRole::Osd => "osd",
            DaemonRole::Mon => "mon",
        }
    }
}

impl fmt::Display for DaemonRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Membership of every osd as reported by the cluster.
///
/// A well-formed snapshot partitions the same universe of ids twice: once
/// into `in`/`out` and once into `live`/`dead`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipSnapshot {
    #[serde(rename = "in")]
    pub in_osds: BTreeSet<OsdId>,
    #[serde(rename = "out")]
    pub out_osds: BTreeSet<OsdId>,
    #[serde(rename = "live")]
    pub live_osds: BTreeSet<OsdId>,
    #[serde(rename = "dead")]
    pub dead_osds: BTreeSet<OsdId>,
}

impl MembershipSnapshot {
    /// Snapshot where every id is in and live.
    pub fn all_up(ids: impl IntoIterator<Item = OsdId>) -> Self {
        let ids: BTreeSet<OsdId> = ids.into_iter().collect();
        Self {
            in_osds: ids.clone(),
            out_osds: BTreeSet::new(),
            live_osds: ids,
            dead_osds: BTreeSet::new(),
        }
    }
}

/// Placement group state counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PgCounts {
    /// Total placement groups.
    pub total: u64,
    /// Placement groups whose state starts with `active+clean`.
    pub active_clean: u64,
    /// Placement groups whose state starts with `active`.
    pub active: u64,
}

impl PgCounts {
    pub fn is_clean(&self) -> bool {
        self.active_clean == self.total
    }

    pub fn is_active(&self) -> bool {
        self.active == self.total
    }
}

/// Result of a monitor time check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeCheck {
    /// Monitor name.
    pub name: String,
    /// Measured skew in seconds.
    pub skew: f64,
    /// Health reported for this monitor (`HEALTH_OK`, `HEALTH_WARN`, ...).
    pub health: String,
    /// Free-form detail from the cluster.
    #[serde(default)]
    pub details: Option<String>,
}
