//! Poll-until-converged primitive shared by every blocking wait.
//!
//! A wait repeatedly runs an async probe. The probe reports either that the
//! cluster converged, or that it is still pending along with an optional
//! progress value. Between probes the wait sleeps for a fixed poll interval;
//! there is no backoff.
//!
//! Two timeout policies exist:
//!
//! - [`TimeoutPolicy::Absolute`]: fail once the wait has run for the timeout.
//! - [`TimeoutPolicy::Stagnation`]: fail once the progress value has not
//!   changed for the timeout. Every change restarts the clock, so a cluster
//!   that keeps making progress may take arbitrarily long overall.
//!
//! Waits hold no shared state, so any number of them may run concurrently
//! against the same cluster.

use crate::error::{Result, ThrashError};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

/// Outcome of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// The predicate holds.
    Converged,
    /// Not there yet. `progress` feeds the stagnation policy.
    Pending { progress: Option<u64> },
}

impl Probe {
    pub fn pending() -> Self {
        Probe::Pending { progress: None }
    }

    pub fn progress(value: u64) -> Self {
        Probe::Pending {
            progress: Some(value),
        }
    }

    pub fn from_bool(done: bool) -> Self {
        if done {
            Probe::Converged
        } else {
            Probe::pending()
        }
    }
}

/// When a wait gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// Wait until the predicate holds, however long that takes.
    Unbounded,
    /// Fail once this much time has passed since the wait began.
    Absolute(Duration),
    /// Fail once this much time has passed since progress last changed.
    Stagnation(Duration),
}

impl TimeoutPolicy {
    /// Absolute policy, unbounded when `timeout` is `None`.
    pub fn absolute(timeout: Option<Duration>) -> Self {
        timeout.map_or(TimeoutPolicy::Unbounded, TimeoutPolicy::Absolute)
    }

    /// Stagnation policy, unbounded when `timeout` is `None`.
    pub fn stagnation(timeout: Option<Duration>) -> Self {
        timeout.map_or(TimeoutPolicy::Unbounded, TimeoutPolicy::Stagnation)
    }

    fn timeout(&self) -> Option<Duration> {
        match self {
            TimeoutPolicy::Unbounded => None,
            TimeoutPolicy::Absolute(t) | TimeoutPolicy::Stagnation(t) => Some(*t),
        }
    }
}

/// Run `probe` every `poll_interval` until it reports [`Probe::Converged`].
///
/// `what` names the condition in logs and in the timeout error. Sleeps are
/// shortened so that a timeout fires at its deadline instead of at the next
/// poll boundary. Probe errors end the wait immediately.
pub async fn wait_until<F, Fut>(
    what: &str,
    poll_interval: Duration,
    policy: TimeoutPolicy,
    mut probe: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Probe>>,
{
    let started = Instant::now();
    let mut window_start = started;
    let mut last_progress: Option<u64> = None;

    loop {
        let progress = match probe().await? {
            Probe::Converged => {
                debug!(what, elapsed = ?started.elapsed(), "converged");
                return Ok(());
            }
            Probe::Pending { progress } => progress,
        };

        let now = Instant::now();
        if let TimeoutPolicy::Stagnation(_) = policy {
            if progress != last_progress {
                if last_progress.is_some() {
                    trace!(what, ?progress, "progress changed, resetting timeout");
                }
                last_progress = progress;
                window_start = now;
            }
        }

        let mut pause = poll_interval;
        if let Some(timeout) = policy.timeout() {
            let waited = now.duration_since(window_start);
            if waited >= timeout {
                return Err(ThrashError::Timeout {
                    what: what.to_string(),
                    elapsed: now.duration_since(started),
                });
            }
            pause = pause.min(timeout - waited);
        }

        sleep(pause).await;
    }
}
