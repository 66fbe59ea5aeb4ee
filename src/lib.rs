//! osd-thrasher - fault injection and convergence waits for storage-cluster
//! integration tests.
//!
//! A [`Thrasher`](thrasher::Thrasher) runs beside a test workload and keeps
//! stopping, restarting, excluding and readmitting storage daemons while
//! keeping configurable floors of healthy daemons. Every so often it pauses
//! until the cluster is clean again. When the test finishes, joining the
//! thrasher brings every daemon back up.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Thrasher loop              ClockSkewCheck loop          │
//! ├──────────────────────────────────────────────────────────┤
//! │  HealthPoller: clean | active | quorum size | osd up     │
//! ├──────────────────────────────────────────────────────────┤
//! │  wait_until: absolute | stagnation | unbounded           │
//! ├──────────────────────────────────────────────────────────┤
//! │  ClusterControl: NoopCluster | SimCluster | CliCluster   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use osd_thrasher::config::HarnessConfig;
//! use osd_thrasher::stop::StopSignal;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> osd_thrasher::Result<()> {
//!     let config = HarnessConfig::default();
//!     let summary = osd_thrasher::run(config, Some(Duration::from_secs(600)), StopSignal::new()).await?;
//!     println!("{} actions applied", summary.history.len());
//!     Ok(())
//! }
//! ```

pub mod cluster;
pub mod config;
pub mod error;
pub mod health;
pub mod membership;
pub mod observability;
pub mod skew;
pub mod stop;
pub mod thrasher;
pub mod types;
pub mod wait;

// Re-exports
pub use error::{Result, ThrashError};
pub use types::*;

use cluster::{CliCluster, ClusterControl, LocalRunner, ShellDaemonControl};
use config::HarnessConfig;
use health::HealthPoller;
use serde::Serialize;
use skew::{ClockSkewCheck, SkewReport};
use std::sync::Arc;
use std::time::Duration;
use stop::StopSignal;
use thrasher::{ActionRecord, Thrasher};
use tracing::{error, info, info_span, warn};

/// Outcome of a harness run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Every action the thrasher applied, in order.
    pub history: Vec<ActionRecord>,
    /// Findings of the skew checker, when it ran.
    pub skew: Option<SkewReport>,
}

/// Run the thrasher against the cluster described by `config`.
///
/// See [`run_with_cluster`].
pub async fn run(
    config: HarnessConfig,
    run_for: Option<Duration>,
    stop: StopSignal,
) -> Result<RunSummary> {
    let runner = LocalRunner::new(&config.cluster.command)?;
    let daemons = ShellDaemonControl::new(config.cluster.daemons.clone());
    let cluster = Arc::new(CliCluster::new(Arc::new(runner), Arc::new(daemons)));
    run_with_cluster(cluster, config, run_for, stop).await
}

/// Run the thrasher, and the skew checker when configured, until `run_for`
/// elapses, `stop` is requested or either loop exits on its own. Both loops
/// are always joined; the thrasher's error wins when both fail.
pub async fn run_with_cluster(
    cluster: Arc<dyn ClusterControl>,
    config: HarnessConfig,
    run_for: Option<Duration>,
    stop: StopSignal,
) -> Result<RunSummary> {
    config.validate()?;
    let health = HealthPoller::with_poll_interval(cluster, config.poll_interval());

    let thrasher = Thrasher::with_health(
        health.clone(),
        config.thrasher.clone(),
        info_span!("thrasher"),
    )
    .await?
    .spawn();

    let skew_check = match (&config.skew_check, config.expected_mons) {
        (Some(skew_config), Some(mons)) => Some(
            ClockSkewCheck::with_health(
                health,
                skew_config.clone(),
                mons,
                info_span!("mon_clock_skew_check"),
            )
            .spawn(),
        ),
        _ => None,
    };

    let run_timer = async {
        match run_for {
            Some(limit) => {
                tokio::time::sleep(limit).await;
                info!(?limit, "run time elapsed");
            }
            None => std::future::pending().await,
        }
    };
    let skew_finished = async {
        match &skew_check {
            Some(handle) => handle.finished().await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = run_timer => {}
        _ = stop.wait() => {}
        _ = thrasher.finished() => warn!("thrasher exited before the run ended"),
        _ = skew_finished => warn!("skew check exited before the run ended"),
    }

    info!("joining thrasher");
    let thrashed = thrasher.join().await;
    let skew = match skew_check {
        Some(handle) => Some(handle.finish_and_join().await),
        None => None,
    };

    let thrasher = thrashed.map_err(|e| {
        error!(error = %e, "thrasher failed");
        e
    })?;
    let skew = skew.transpose()?;

    Ok(RunSummary {
        history: thrasher.history().to_vec(),
        skew,
    })
}
