//! The fault-injection controller.
//!
//! A [`Thrasher`] owns the membership state and is the only thing that
//! mutates it. Construction waits for a clean cluster, snapshots
//! membership and disables the cluster's automatic down-out timer.
//! [`Thrasher::spawn`] then moves the controller into a background task that
//! repeatedly picks a weighted random action, occasionally pausing to let
//! the cluster go clean. [`ThrasherHandle::join`] stops the loop, waits for it
//! to bring every osd back up and returns the controller.
//!
//! # Example
//!
//! ```no_run
//! use osd_thrasher::cluster::SimCluster;
//! use osd_thrasher::config::ThrashConfig;
//! use osd_thrasher::thrasher::Thrasher;
//! use std::sync::Arc;
//!
//! # async fn run() -> osd_thrasher::Result<()> {
//! let cluster = Arc::new(SimCluster::new(6, 3));
//! let handle = Thrasher::start(cluster, ThrashConfig::default(), tracing::info_span!("thrasher")).await?;
//! // ... run the workload ...
//! let thrasher = handle.join().await?;
//! assert!(thrasher.membership().is_all_up());
//! # Ok(())
//! # }
//! ```

use crate::cluster::ClusterControl;
use crate::config::ThrashConfig;
use crate::error::{Result, ThrashError};
use crate::health::HealthPoller;
use crate::membership::Membership;
use crate::observability;
use crate::stop::StopSignal;
use crate::types::OsdId;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, Instrument, Span};

/// A fault the controller can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    MarkOut,
    Kill,
    /// Enable the I/O blackhole, then kill. Never picked by the loop.
    BlackholeKill,
    MarkIn,
    Revive,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::MarkOut => "mark_out",
            Action::Kill => "kill",
            Action::BlackholeKill => "blackhole_kill",
            Action::MarkIn => "mark_in",
            Action::Revive => "revive",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One applied action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action: Action,
    pub osd: OsdId,
    pub at: DateTime<Utc>,
}

/// Pick the next action by weight, or `None` when every action is disabled
/// by its floor.
///
/// Candidates are considered in a fixed order: mark-out, kill, mark-in,
/// revive. Kill weighs `chance_down`; the rest weigh 1.0.
pub fn choose_action<R: Rng + ?Sized>(
    membership: &Membership,
    config: &ThrashConfig,
    rng: &mut R,
) -> Option<Action> {
    let mut candidates: Vec<(Action, f64)> = Vec::with_capacity(4);
    if membership.in_osds().len() > config.min_in {
        candidates.push((Action::MarkOut, 1.0));
    }
    if membership.live_osds().len() > config.min_live && config.chance_down > 0.0 {
        candidates.push((Action::Kill, config.chance_down));
    }
    if membership.out_osds().len() > config.min_out {
        candidates.push((Action::MarkIn, 1.0));
    }
    if membership.dead_osds().len() > config.min_dead {
        candidates.push((Action::Revive, 1.0));
    }
    if candidates.is_empty() {
        return None;
    }

    let total: f64 = candidates.iter().map(|(_, weight)| weight).sum();
    let mut val = rng.gen_range(0.0..total);
    for (action, weight) in candidates {
        if val < weight {
            return Some(action);
        }
        val -= weight;
    }
    None
}

/// The fault-injection controller.
pub struct Thrasher {
    health: HealthPoller,
    config: ThrashConfig,
    membership: Membership,
    rng: StdRng,
    history: Vec<ActionRecord>,
    span: Span,
}

impl Thrasher {
    /// Wait for a clean cluster, snapshot membership and disable automatic
    /// eviction. Uses the default poll interval.
    pub async fn new(
        cluster: Arc<dyn ClusterControl>,
        config: ThrashConfig,
        span: Span,
    ) -> Result<Self> {
        Self::with_health(HealthPoller::new(cluster), config, span).await
    }

    /// Like [`Thrasher::new`], waiting through `health`.
    pub async fn with_health(health: HealthPoller, config: ThrashConfig, span: Span) -> Result<Self> {
        config.validate()?;

        let setup = async {
            health.wait_till_clean(config.timeout).await?;
            let snapshot = health.cluster().membership_snapshot().await?;
            let membership = Membership::from_snapshot(snapshot)?;
            health.cluster().disable_auto_eviction().await?;
            info!(%membership, "thrasher ready");
            Ok::<_, ThrashError>(membership)
        };
        let membership = setup.instrument(span.clone()).await?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            health,
            config,
            membership,
            rng,
            history: Vec::new(),
            span,
        })
    }

    /// [`Thrasher::new`] followed by [`Thrasher::spawn`].
    pub async fn start(
        cluster: Arc<dyn ClusterControl>,
        config: ThrashConfig,
        span: Span,
    ) -> Result<ThrasherHandle> {
        Ok(Self::new(cluster, config, span).await?.spawn())
    }

    /// Move the controller into a background injection loop.
    pub fn spawn(self) -> ThrasherHandle {
        let stop = StopSignal::new();
        let (done_tx, done) = watch::channel(false);
        let span = self.span.clone();
        let run = self.run(stop.clone());
        let task = tokio::spawn(
            async move {
                let result = run.await;
                let _ = done_tx.send(true);
                result
            }
            .instrument(span),
        );
        ThrasherHandle { stop, done, task }
    }

    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    pub fn history(&self) -> &[ActionRecord] {
        &self.history
    }

    pub fn config(&self) -> &ThrashConfig {
        &self.config
    }

    async fn run(mut self, stop: StopSignal) -> Result<Self> {
        info!("starting do_thrash");
        let clean_probability = self.config.clean_probability();

        while !stop.is_stop_requested() {
            info!(membership = %self.membership, "thrash cycle");
            observability::update_membership(
                self.membership.out_osds().len(),
                self.membership.dead_osds().len(),
            );
            if self.rng.gen::<f64>() < clean_probability {
                while self.membership.dead_osds().len() > self.config.max_dead {
                    self.revive_osd(None).await?;
                }
                observability::record_clean_wait();
                self.health.wait_till_clean(self.config.timeout).await?;
            }
            if let Some(action) = self.choose_action() {
                self.apply(action).await?;
            }
            tokio::time::sleep(self.config.op_delay).await;
        }

        self.all_up().await?;
        Ok(self)
    }

    /// Pick the next action with this controller's rng.
    pub fn choose_action(&mut self) -> Option<Action> {
        let action = choose_action(&self.membership, &self.config, &mut self.rng);
        debug!(?action, "chose action");
        action
    }

    async fn apply(&mut self, action: Action) -> Result<OsdId> {
        match action {
            Action::MarkOut => self.out_osd(None).await,
            Action::Kill => self.kill_osd(None).await,
            Action::BlackholeKill => self.blackhole_kill_osd(None).await,
            Action::MarkIn => self.in_osd(None).await,
            Action::Revive => self.revive_osd(None).await,
        }
    }

    /// Stop a live osd, random when `osd` is `None`. Returns the osd acted on.
    pub async fn kill_osd(&mut self, osd: Option<OsdId>) -> Result<OsdId> {
        let span = self.span.clone();
        self.kill(osd, false).instrument(span).await
    }

    /// Blackhole a live osd's I/O, then stop it.
    pub async fn blackhole_kill_osd(&mut self, osd: Option<OsdId>) -> Result<OsdId> {
        let span = self.span.clone();
        self.kill(osd, true).instrument(span).await
    }

    /// Restart a dead osd.
    pub async fn revive_osd(&mut self, osd: Option<OsdId>) -> Result<OsdId> {
        let span = self.span.clone();
        async move {
            let osd = self.target(osd, Membership::random_dead, "dead")?;
            info!(osd, dead_osds = ?self.membership.dead_osds(), "Reviving osd");
            self.membership.revive(osd)?;
            self.health.cluster().restart_osd(osd).await?;
            self.record(Action::Revive, osd);
            Ok::<_, ThrashError>(osd)
        }
        .instrument(span)
        .await
    }

    /// Exclude an in osd from data placement.
    pub async fn out_osd(&mut self, osd: Option<OsdId>) -> Result<OsdId> {
        let span = self.span.clone();
        async move {
            let osd = self.target(osd, Membership::random_in, "in")?;
            info!(osd, in_osds = ?self.membership.in_osds(), "Removing osd");
            self.membership.mark_out(osd)?;
            self.health.cluster().mark_out(osd).await?;
            self.record(Action::MarkOut, osd);
            Ok::<_, ThrashError>(osd)
        }
        .instrument(span)
        .await
    }

    /// Admit an out osd. A dead osd is revived instead and stays out.
    pub async fn in_osd(&mut self, osd: Option<OsdId>) -> Result<OsdId> {
        let span = self.span.clone();
        async move {
            let osd = self.target(osd, Membership::random_out, "out")?;
            if self.membership.is_dead(osd) {
                return self.revive_osd(Some(osd)).await;
            }
            info!(osd, out_osds = ?self.membership.out_osds(), "Adding osd");
            self.membership.mark_in(osd)?;
            self.health.cluster().mark_in(osd).await?;
            self.record(Action::MarkIn, osd);
            Ok(osd)
        }
        .instrument(span)
        .await
    }

    /// Revive every dead osd, then admit every out osd.
    pub async fn all_up(&mut self) -> Result<()> {
        let span = self.span.clone();
        async move {
            while !self.membership.dead_osds().is_empty() {
                self.revive_osd(None).await?;
            }
            while !self.membership.out_osds().is_empty() {
                self.in_osd(None).await?;
            }
            info!(membership = %self.membership, "all osds up");
            Ok::<_, ThrashError>(())
        }
        .instrument(span)
        .await
    }

    async fn kill(&mut self, osd: Option<OsdId>, blackhole: bool) -> Result<OsdId> {
        let osd = self.target(osd, Membership::random_live, "live")?;
        info!(osd, blackhole, live_osds = ?self.membership.live_osds(), "Killing osd");
        self.membership.kill(osd)?;
        let cluster = self.health.cluster();
        if blackhole {
            cluster.enable_blackhole(osd).await?;
        }
        cluster.stop_osd(osd).await?;
        let action = if blackhole {
            Action::BlackholeKill
        } else {
            Action::Kill
        };
        self.record(action, osd);
        Ok(osd)
    }

    fn target(
        &mut self,
        osd: Option<OsdId>,
        pick: fn(&Membership, &mut StdRng) -> Option<OsdId>,
        set: &str,
    ) -> Result<OsdId> {
        match osd {
            Some(osd) => Ok(osd),
            None => pick(&self.membership, &mut self.rng)
                .ok_or_else(|| ThrashError::NoCandidate(format!("no {} osds", set))),
        }
    }

    fn record(&mut self, action: Action, osd: OsdId) {
        observability::record_action(action.as_str());
        self.history.push(ActionRecord {
            action,
            osd,
            at: Utc::now(),
        });
    }
}

/// Handle to a running injection loop.
pub struct ThrasherHandle {
    stop: StopSignal,
    done: watch::Receiver<bool>,
    task: JoinHandle<Result<Thrasher>>,
}

impl ThrasherHandle {
    /// Ask the loop to stop at its next iteration without waiting.
    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Resolve once the loop has exited, whether it was asked to or failed.
    /// The result is still collected with [`ThrasherHandle::join`].
    pub async fn finished(&self) {
        let mut done = self.done.clone();
        // A dropped sender means the task ended without reporting.
        let _ = done.wait_for(|done| *done).await;
    }

    /// Request a stop, wait for the loop to bring every osd back up and
    /// exit, and hand the controller back. Errors raised inside the loop
    /// surface here.
    pub async fn join(self) -> Result<Thrasher> {
        self.stop.request_stop();
        self.task.await?
    }
}
