//! Monitor clock-skew checker.
//!
//! Runs alongside the thrasher. Each round waits for the expected quorum,
//! reads the monitors' time checks and records every monitor whose skew is
//! above `max_skew`. When finished it compares what it saw against
//! `expect_skew`.

use crate::cluster::ClusterControl;
use crate::config::SkewCheckConfig;
use crate::error::{Result, ThrashError};
use crate::health::{HealthPoller, DEFAULT_QUORUM_TIMEOUT};
use crate::stop::StopSignal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument, Span};

const HEALTH_WARN: &str = "HEALTH_WARN";

/// A monitor found skewed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkewRecord {
    pub skew: f64,
    pub details: Option<String>,
}

/// Every skewed monitor seen over a run, keyed by monitor name. Later
/// rounds overwrite earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SkewReport {
    pub skews: BTreeMap<String, SkewRecord>,
}

impl SkewReport {
    pub fn found_skew(&self) -> bool {
        !self.skews.is_empty()
    }
}

pub struct ClockSkewCheck {
    health: HealthPoller,
    config: SkewCheckConfig,
    expected_quorum: usize,
    quorum_timeout: Duration,
    span: Span,
}

impl ClockSkewCheck {
    pub fn new(
        cluster: Arc<dyn ClusterControl>,
        config: SkewCheckConfig,
        expected_quorum: usize,
        span: Span,
    ) -> Self {
        Self::with_health(HealthPoller::new(cluster), config, expected_quorum, span)
    }

    pub fn with_health(
        health: HealthPoller,
        config: SkewCheckConfig,
        expected_quorum: usize,
        span: Span,
    ) -> Self {
        Self {
            health,
            config,
            expected_quorum,
            quorum_timeout: DEFAULT_QUORUM_TIMEOUT,
            span,
        }
    }

    /// Override how long each round waits for quorum.
    pub fn quorum_timeout(mut self, timeout: Duration) -> Self {
        self.quorum_timeout = timeout;
        self
    }

    /// Check until `stop` is requested, then evaluate the findings.
    pub async fn run(&self, stop: &StopSignal) -> Result<SkewReport> {
        let span = self.span.clone();
        async move {
            info!("start checking for clock skews");
            let mut report = SkewReport::default();
            while !stop.is_stop_requested() {
                self.check_once(&mut report).await?;
                if self.config.interval.is_zero() {
                    tokio::task::yield_now().await;
                } else {
                    tokio::time::sleep(self.config.interval).await;
                }
            }
            self.log_report(&report);
            self.evaluate(&report)?;
            Ok::<_, ThrashError>(report)
        }
        .instrument(span)
        .await
    }

    /// Run the checker in a background task.
    pub fn spawn(self) -> SkewCheckHandle {
        let stop = StopSignal::new();
        let task_stop = stop.clone();
        let (done_tx, done) = watch::channel(false);
        let task = tokio::spawn(async move {
            let result = self.run(&task_stop).await;
            let _ = done_tx.send(true);
            result
        });
        SkewCheckHandle { stop, done, task }
    }

    async fn check_once(&self, report: &mut SkewReport) -> Result<()> {
        self.health
            .wait_for_mon_quorum_size(self.expected_quorum, Some(self.quorum_timeout))
            .await?;

        for check in self.health.cluster().mon_timechecks().await? {
            if check.skew <= self.config.max_skew {
                continue;
            }
            if check.health != HEALTH_WARN {
                return Err(ThrashError::MonHealth(format!(
                    "mon.{} health is '{}' but skew {} > max {}",
                    check.name, check.health, check.skew, self.config.max_skew
                )));
            }

            let line = format!(
                "mon.{} with skew {} > max {}",
                check.name, check.skew, self.config.max_skew
            );
            if self.config.expect_skew {
                info!("expected skew: {}", line);
            } else {
                warn!("unexpected skew: {}", line);
            }
            report.skews.insert(
                check.name,
                SkewRecord {
                    skew: check.skew,
                    details: check.details,
                },
            );
        }
        Ok(())
    }

    fn log_report(&self, report: &SkewReport) {
        if !report.found_skew() {
            info!("---------- no skews were found ----------");
            return;
        }
        info!("---------- found {} skews ----------", report.skews.len());
        for (mon, record) in &report.skews {
            info!(skew = record.skew, details = ?record.details, "mon.{}", mon);
        }
        info!("-------------------------------------");
    }

    fn evaluate(&self, report: &SkewReport) -> Result<()> {
        let mismatch = match (self.config.expect_skew, report.found_skew()) {
            (true, false) => "We were expecting a skew, but none was found!",
            (false, true) => "We were not expecting a skew, but we did find it!",
            _ => return Ok(()),
        };
        info!("{}", mismatch);
        if self.config.never_fail {
            Ok(())
        } else {
            Err(ThrashError::SkewExpectation(mismatch.to_string()))
        }
    }
}

/// Handle to a background [`ClockSkewCheck`].
pub struct SkewCheckHandle {
    stop: StopSignal,
    done: watch::Receiver<bool>,
    task: JoinHandle<Result<SkewReport>>,
}

impl SkewCheckHandle {
    /// Resolve once the checker has exited on its own or after a finish.
    pub async fn finished(&self) {
        let mut done = self.done.clone();
        let _ = done.wait_for(|done| *done).await;
    }

    /// Finish the current round, evaluate and return the report.
    pub async fn finish_and_join(self) -> Result<SkewReport> {
        info!("joining mon_clock_skew_check");
        self.stop.request_stop();
        self.task.await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::SimCluster;
    use crate::types::TimeCheck;

    fn check(name: &str, skew: f64, health: &str) -> TimeCheck {
        TimeCheck {
            name: name.to_string(),
            skew,
            health: health.to_string(),
            details: Some("clock skew".to_string()),
        }
    }

    fn config(expect_skew: bool, never_fail: bool) -> SkewCheckConfig {
        SkewCheckConfig {
            interval: Duration::from_secs(1),
            expect_skew,
            never_fail,
            ..SkewCheckConfig::default()
        }
    }

    async fn one_round(sim: Arc<SimCluster>, config: SkewCheckConfig) -> Result<SkewReport> {
        let checker = ClockSkewCheck::new(sim, config, 3, Span::none());
        let mut report = SkewReport::default();
        checker.check_once(&mut report).await?;
        checker.log_report(&report);
        checker.evaluate(&report)?;
        Ok(report)
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_skew_passes() {
        let sim = Arc::new(SimCluster::new(3, 3));
        sim.set_timechecks(vec![check("a", 0.01, "HEALTH_OK")]).await;

        let report = one_round(sim, config(false, false)).await.unwrap();
        assert!(!report.found_skew());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_skew_fails() {
        let sim = Arc::new(SimCluster::new(3, 3));
        sim.set_timechecks(vec![check("b", 0.2, HEALTH_WARN)]).await;

        let err = one_round(sim, config(false, false)).await.unwrap_err();
        assert!(matches!(err, ThrashError::SkewExpectation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_fail_reports_only() {
        let sim = Arc::new(SimCluster::new(3, 3));
        sim.set_timechecks(vec![check("b", 0.2, HEALTH_WARN)]).await;

        let report = one_round(sim, config(false, true)).await.unwrap();
        assert_eq!(report.skews["b"].skew, 0.2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_expected_skew_fails() {
        let sim = Arc::new(SimCluster::new(3, 3));
        let err = one_round(sim, config(true, false)).await.unwrap_err();
        assert!(err.to_string().contains("none was found"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_skew_without_warning_is_fatal() {
        let sim = Arc::new(SimCluster::new(3, 3));
        sim.set_timechecks(vec![check("c", 0.5, "HEALTH_OK")]).await;

        let err = one_round(sim, config(true, true)).await.unwrap_err();
        assert!(matches!(err, ThrashError::MonHealth(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_checker_finishes() {
        let sim = Arc::new(SimCluster::new(3, 3));
        sim.set_timechecks(vec![check("a", 0.3, HEALTH_WARN)]).await;

        let handle = ClockSkewCheck::new(sim, config(true, false), 3, Span::none()).spawn();
        tokio::time::sleep(Duration::from_secs(5)).await;
        let report = handle.finish_and_join().await.unwrap();
        assert!(report.skews.contains_key("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_quorum_times_out() {
        let sim = Arc::new(SimCluster::new(3, 3));
        sim.set_quorum([0, 2]).await;
        let checker = ClockSkewCheck::new(sim, config(false, false), 3, Span::none())
            .quorum_timeout(Duration::from_secs(5));

        let started = tokio::time::Instant::now();
        let err = checker.run(&StopSignal::new()).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_still_yields() {
        let sim = Arc::new(SimCluster::new(3, 3));
        let config = SkewCheckConfig {
            interval: Duration::ZERO,
            ..SkewCheckConfig::default()
        };

        let handle = ClockSkewCheck::new(sim, config, 3, Span::none()).spawn();
        tokio::task::yield_now().await;
        let report = handle.finish_and_join().await.unwrap();
        assert!(!report.found_skew());
    }
}
