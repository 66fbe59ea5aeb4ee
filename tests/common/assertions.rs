//! Assertions over thrasher and cluster state.

use osd_thrasher::cluster::{ClusterControl, SimCluster};
use osd_thrasher::config::ThrashConfig;
use osd_thrasher::membership::Membership;
use osd_thrasher::thrasher::{Action, ActionRecord};
use osd_thrasher::types::MembershipSnapshot;

/// The simulated cluster reports every osd in and running.
pub async fn assert_cluster_all_up(cluster: &SimCluster) {
    let snapshot = cluster
        .membership_snapshot()
        .await
        .expect("snapshot failed");
    assert!(snapshot.out_osds.is_empty(), "out osds: {:?}", snapshot.out_osds);
    assert!(
        snapshot.dead_osds.is_empty(),
        "dead osds: {:?}",
        snapshot.dead_osds
    );
}

/// Replay `history` from `initial`, checking partitions after every step
/// and the floors after every loop-chosen action. Returns the final state.
pub fn replay_history(
    initial: MembershipSnapshot,
    history: &[ActionRecord],
    config: &ThrashConfig,
) -> Membership {
    let mut membership = Membership::from_snapshot(initial).expect("invalid initial snapshot");
    for record in history {
        match record.action {
            Action::MarkOut => {
                membership.mark_out(record.osd).expect("replay mark_out");
                assert!(membership.in_osds().len() >= config.min_in);
            }
            Action::Kill | Action::BlackholeKill => {
                membership.kill(record.osd).expect("replay kill");
                assert!(membership.live_osds().len() >= config.min_live);
            }
            Action::MarkIn => membership.mark_in(record.osd).expect("replay mark_in"),
            Action::Revive => membership.revive(record.osd).expect("replay revive"),
        }
        membership
            .check_invariants()
            .expect("partition broken during replay");
    }
    membership
}
