//! The thrasher's view of osd membership.
//!
//! Two independent partitions of the same set of osd ids:
//!
//! - admission: `in` / `out`
//! - liveness: `live` / `dead`
//!
//! Every transition removes an id from one half of an axis and inserts it
//! into the other half in the same call, so no observer can see an id in
//! neither or both halves.

use crate::error::{Result, ThrashError};
use crate::types::{MembershipSnapshot, OsdId};
use rand::seq::IteratorRandom;
use rand::Rng;
use std::collections::BTreeSet;
use std::fmt;

/// Single-writer membership state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    in_osds: BTreeSet<OsdId>,
    out_osds: BTreeSet<OsdId>,
    live_osds: BTreeSet<OsdId>,
    dead_osds: BTreeSet<OsdId>,
}

impl Membership {
    /// Build from a cluster snapshot, rejecting snapshots that are not two
    /// partitions of one universe.
    pub fn from_snapshot(snapshot: MembershipSnapshot) -> Result<Self> {
        let MembershipSnapshot {
            in_osds,
            out_osds,
            live_osds,
            dead_osds,
        } = snapshot;

        if let Some(id) = in_osds.intersection(&out_osds).next() {
            return Err(ThrashError::ContractViolation(format!(
                "osd.{} reported both in and out",
                id
            )));
        }
        if let Some(id) = live_osds.intersection(&dead_osds).next() {
            return Err(ThrashError::ContractViolation(format!(
                "osd.{} reported both live and dead",
                id
            )));
        }

        let admission: BTreeSet<OsdId> = in_osds.union(&out_osds).copied().collect();
        let liveness: BTreeSet<OsdId> = live_osds.union(&dead_osds).copied().collect();
        if let Some(id) = admission.symmetric_difference(&liveness).next() {
            return Err(ThrashError::ContractViolation(format!(
                "osd.{} missing from the {} axis",
                id,
                if admission.contains(id) {
                    "live/dead"
                } else {
                    "in/out"
                }
            )));
        }

        Ok(Self {
            in_osds,
            out_osds,
            live_osds,
            dead_osds,
        })
    }

    pub fn in_osds(&self) -> &BTreeSet<OsdId> {
        &self.in_osds
    }

    pub fn out_osds(&self) -> &BTreeSet<OsdId> {
        &self.out_osds
    }

    pub fn live_osds(&self) -> &BTreeSet<OsdId> {
        &self.live_osds
    }

    pub fn dead_osds(&self) -> &BTreeSet<OsdId> {
        &self.dead_osds
    }

    /// Every osd id tracked.
    pub fn universe(&self) -> BTreeSet<OsdId> {
        self.in_osds.union(&self.out_osds).copied().collect()
    }

    pub fn is_dead(&self, osd: OsdId) -> bool {
        self.dead_osds.contains(&osd)
    }

    /// No osd is out or dead.
    pub fn is_all_up(&self) -> bool {
        self.out_osds.is_empty() && self.dead_osds.is_empty()
    }

    /// Current state as a snapshot.
    pub fn snapshot(&self) -> MembershipSnapshot {
        MembershipSnapshot {
            in_osds: self.in_osds.clone(),
            out_osds: self.out_osds.clone(),
            live_osds: self.live_osds.clone(),
            dead_osds: self.dead_osds.clone(),
        }
    }

    /// Check both partition invariants.
    pub fn check_invariants(&self) -> Result<()> {
        Self::from_snapshot(self.snapshot()).map(|_| ())
    }

    pub fn random_in<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<OsdId> {
        self.in_osds.iter().copied().choose(rng)
    }

    pub fn random_out<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<OsdId> {
        self.out_osds.iter().copied().choose(rng)
    }

    pub fn random_live<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<OsdId> {
        self.live_osds.iter().copied().choose(rng)
    }

    pub fn random_dead<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<OsdId> {
        self.dead_osds.iter().copied().choose(rng)
    }

    /// live → dead.
    pub fn kill(&mut self, osd: OsdId) -> Result<()> {
        Self::transfer(&mut self.live_osds, &mut self.dead_osds, osd, "live")
    }

    /// dead → live.
    pub fn revive(&mut self, osd: OsdId) -> Result<()> {
        Self::transfer(&mut self.dead_osds, &mut self.live_osds, osd, "dead")
    }

    /// in → out.
    pub fn mark_out(&mut self, osd: OsdId) -> Result<()> {
        Self::transfer(&mut self.in_osds, &mut self.out_osds, osd, "in")
    }

    /// out → in.
    pub fn mark_in(&mut self, osd: OsdId) -> Result<()> {
        Self::transfer(&mut self.out_osds, &mut self.in_osds, osd, "out")
    }

    fn transfer(
        from: &mut BTreeSet<OsdId>,
        to: &mut BTreeSet<OsdId>,
        osd: OsdId,
        from_name: &str,
    ) -> Result<()> {
        if !from.remove(&osd) {
            return Err(ThrashError::ContractViolation(format!(
                "osd.{} is not {}",
                osd, from_name
            )));
        }
        to.insert(osd);
        Ok(())
    }
}

impl fmt::Display for Membership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "in_osds: {:?} out_osds: {:?} dead_osds: {:?} live_osds: {:?}",
            self.in_osds, self.out_osds, self.dead_osds, self.live_osds
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn four_up() -> Membership {
        Membership::from_snapshot(MembershipSnapshot::all_up(0..4)).unwrap()
    }

    #[test]
    fn test_from_valid_snapshot() {
        let m = four_up();
        assert_eq!(m.universe().len(), 4);
        assert!(m.is_all_up());
        assert!(m.check_invariants().is_ok());
    }

    #[test]
    fn test_rejects_id_in_both_halves() {
        let mut snap = MembershipSnapshot::all_up(0..3);
        snap.out_osds.insert(1);
        let err = Membership::from_snapshot(snap).unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_rejects_id_missing_from_liveness() {
        let mut snap = MembershipSnapshot::all_up(0..3);
        snap.live_osds.remove(&2);
        let err = Membership::from_snapshot(snap).unwrap_err();
        assert!(err.to_string().contains("live/dead"));
    }

    #[test]
    fn test_transitions_keep_partitions() {
        let mut m = four_up();
        m.kill(1).unwrap();
        m.mark_out(2).unwrap();
        assert!(m.is_dead(1));
        assert!(m.out_osds().contains(&2));
        assert!(m.check_invariants().is_ok());

        m.revive(1).unwrap();
        m.mark_in(2).unwrap();
        assert!(m.is_all_up());
        assert!(m.check_invariants().is_ok());
    }

    #[test]
    fn test_invalid_transition_leaves_state_untouched() {
        let mut m = four_up();
        let before = m.clone();
        assert!(m.revive(0).is_err());
        assert!(m.mark_in(3).is_err());
        assert_eq!(m, before);
    }

    #[test]
    fn test_random_choice_from_expected_set() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut m = four_up();
        assert!(m.random_dead(&mut rng).is_none());

        m.kill(3).unwrap();
        assert_eq!(m.random_dead(&mut rng), Some(3));
        for _ in 0..32 {
            assert_ne!(m.random_live(&mut rng), Some(3));
        }
    }
}
