//! Blocking waits on cluster health.
//!
//! Each wait is the convergence monitor bound to one cluster predicate:
//!
//! | wait | predicate | policy |
//! |---|---|---|
//! | [`HealthPoller::wait_till_clean`] | every pg active+clean | stagnation on the active+clean count |
//! | [`HealthPoller::wait_till_active`] | every pg active | absolute |
//! | [`HealthPoller::wait_for_mon_quorum_size`] | quorum has exactly `size` mons | absolute |
//! | [`HealthPoller::wait_till_osd_up`] | osd marked up | absolute |

use crate::cluster::ClusterControl;
use crate::config::DEFAULT_POLL_INTERVAL;
use crate::error::Result;
use crate::types::OsdId;
use crate::wait::{wait_until, Probe, TimeoutPolicy};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Default timeout for quorum waits.
pub const DEFAULT_QUORUM_TIMEOUT: Duration = Duration::from_secs(300);

/// Health waits against one cluster.
#[derive(Clone)]
pub struct HealthPoller {
    cluster: Arc<dyn ClusterControl>,
    poll_interval: Duration,
}

impl HealthPoller {
    pub fn new(cluster: Arc<dyn ClusterControl>) -> Self {
        Self::with_poll_interval(cluster, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(cluster: Arc<dyn ClusterControl>, poll_interval: Duration) -> Self {
        Self {
            cluster,
            poll_interval,
        }
    }

    pub fn cluster(&self) -> &Arc<dyn ClusterControl> {
        &self.cluster
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Wait until every placement group is active+clean.
    ///
    /// `timeout` bounds how long the active+clean count may stay unchanged,
    /// not the total wait.
    pub async fn wait_till_clean(&self, timeout: Option<Duration>) -> Result<()> {
        info!("waiting till clean");
        wait_until(
            "cluster to become clean",
            self.poll_interval,
            TimeoutPolicy::stagnation(timeout),
            || async move {
                if self.cluster.is_clean().await? {
                    return Ok(Probe::Converged);
                }
                let counts = self.cluster.pg_counts().await?;
                Ok(Probe::progress(counts.active_clean))
            },
        )
        .await?;
        info!("clean!");
        Ok(())
    }

    /// Wait until every placement group is active.
    pub async fn wait_till_active(&self, timeout: Option<Duration>) -> Result<()> {
        info!("waiting till active");
        wait_until(
            "cluster to become active",
            self.poll_interval,
            TimeoutPolicy::absolute(timeout),
            || async move { Ok(Probe::from_bool(self.cluster.pg_counts().await?.is_active())) },
        )
        .await?;
        info!("active!");
        Ok(())
    }

    /// Wait until exactly `size` monitors are in quorum.
    pub async fn wait_for_mon_quorum_size(
        &self,
        size: usize,
        timeout: Option<Duration>,
    ) -> Result<()> {
        info!(size, "waiting for quorum size");
        let what = format!("quorum size {}", size);
        wait_until(
            &what,
            self.poll_interval,
            TimeoutPolicy::absolute(timeout),
            || async move {
                let quorum = self.cluster.mon_quorum().await?;
                Ok(Probe::from_bool(quorum.len() == size))
            },
        )
        .await?;
        info!(size, "quorum reached");
        Ok(())
    }

    /// Wait until the cluster map reports `osd` up.
    pub async fn wait_till_osd_up(&self, osd: OsdId, timeout: Option<Duration>) -> Result<()> {
        info!(osd, "waiting for osd to be up");
        let what = format!("osd.{} to come up", osd);
        wait_until(
            &what,
            self.poll_interval,
            TimeoutPolicy::absolute(timeout),
            || async move { Ok(Probe::from_bool(self.cluster.is_osd_up(osd).await?)) },
        )
        .await?;
        info!(osd, "osd is up");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{NoopCluster, SimCluster};
    use crate::types::PgCounts;
    use tokio::time::Instant;

    fn counts(total: u64, active_clean: u64, active: u64) -> PgCounts {
        PgCounts {
            total,
            active_clean,
            active,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_noop_cluster_is_immediately_healthy() {
        let poller = HealthPoller::new(Arc::new(NoopCluster::new(0..3, 3)));
        poller.wait_till_clean(None).await.unwrap();
        poller.wait_till_active(Some(Duration::from_secs(1))).await.unwrap();
        poller
            .wait_for_mon_quorum_size(3, Some(Duration::from_secs(1)))
            .await
            .unwrap();
        poller.wait_till_osd_up(1, None).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_after_progress() {
        let sim = Arc::new(SimCluster::new(3, 3));
        sim.script_pg_counts([
            counts(8, 2, 8),
            counts(8, 5, 8),
            counts(8, 8, 8),
        ])
        .await;
        let poller = HealthPoller::new(sim);

        let started = Instant::now();
        poller
            .wait_till_clean(Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(started.elapsed(), DEFAULT_POLL_INTERVAL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_times_out() {
        let sim = Arc::new(SimCluster::new(3, 3));
        sim.script_pg_counts([counts(8, 0, 6)]).await;
        let poller = HealthPoller::with_poll_interval(sim, Duration::from_secs(1));

        let err = poller
            .wait_till_active(Some(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_quorum_regained_after_mon_restart() {
        let sim = Arc::new(SimCluster::new(3, 3));
        sim.stop_mon("2").await.unwrap();
        let poller = HealthPoller::with_poll_interval(sim.clone(), Duration::from_secs(1));

        let err = poller
            .wait_for_mon_quorum_size(3, Some(Duration::from_secs(2)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        let restart = async {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            sim.restart_mon("2").await.unwrap();
        };
        let started = Instant::now();
        let (result, ()) = tokio::join!(
            poller.wait_for_mon_quorum_size(3, Some(Duration::from_secs(10))),
            restart
        );
        result.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_wait_uses_cluster_verdict() {
        // Counts never look clean, but the backend says it is.
        struct CleanByVerdict(SimCluster);

        #[async_trait::async_trait]
        impl ClusterControl for CleanByVerdict {
            async fn membership_snapshot(&self) -> Result<crate::types::MembershipSnapshot> {
                self.0.membership_snapshot().await
            }
            async fn pg_counts(&self) -> Result<PgCounts> {
                Ok(counts(8, 0, 8))
            }
            async fn is_clean(&self) -> Result<bool> {
                Ok(true)
            }
            async fn mon_quorum(&self) -> Result<std::collections::BTreeSet<crate::types::MonRank>> {
                self.0.mon_quorum().await
            }
            async fn is_osd_up(&self, osd: OsdId) -> Result<bool> {
                self.0.is_osd_up(osd).await
            }
            async fn mon_timechecks(&self) -> Result<Vec<crate::types::TimeCheck>> {
                self.0.mon_timechecks().await
            }
            async fn num_unfound_objects(&self) -> Result<u64> {
                self.0.num_unfound_objects().await
            }
            async fn stop_osd(&self, osd: OsdId) -> Result<()> {
                self.0.stop_osd(osd).await
            }
            async fn restart_osd(&self, osd: OsdId) -> Result<()> {
                self.0.restart_osd(osd).await
            }
            async fn mark_in(&self, osd: OsdId) -> Result<()> {
                self.0.mark_in(osd).await
            }
            async fn mark_out(&self, osd: OsdId) -> Result<()> {
                self.0.mark_out(osd).await
            }
            async fn mark_down_osd(&self, osd: OsdId) -> Result<()> {
                self.0.mark_down_osd(osd).await
            }
            async fn enable_blackhole(&self, osd: OsdId) -> Result<()> {
                self.0.enable_blackhole(osd).await
            }
            async fn disable_auto_eviction(&self) -> Result<()> {
                self.0.disable_auto_eviction().await
            }
            async fn stop_mon(&self, mon: &str) -> Result<()> {
                self.0.stop_mon(mon).await
            }
            async fn restart_mon(&self, mon: &str) -> Result<()> {
                self.0.restart_mon(mon).await
            }
        }

        let poller = HealthPoller::new(Arc::new(CleanByVerdict(SimCluster::new(1, 1))));
        let started = Instant::now();
        poller
            .wait_till_clean(Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_osd_up_after_restart() {
        let sim = Arc::new(SimCluster::new(3, 3));
        sim.stop_osd(2).await.unwrap();
        let poller = HealthPoller::with_poll_interval(sim.clone(), Duration::from_secs(1));

        let restart = async {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            sim.restart_osd(2).await.unwrap();
        };
        let started = Instant::now();
        let (result, ()) = tokio::join!(
            poller.wait_till_osd_up(2, Some(Duration::from_secs(10))),
            restart
        );
        result.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }
}
