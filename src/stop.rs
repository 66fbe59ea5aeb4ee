//! Cooperative stop requests for background loops.
//!
//! Loops sample [`StopSignal::is_stop_requested`] at the top of each
//! iteration and never abort mid-action. Anything else that wants to block
//! until a stop arrives (the binary's run timer, for example) can await
//! [`StopSignal::wait`].

use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// A one-way, idempotent stop flag shared between an owner and a task.
#[derive(Clone)]
pub struct StopSignal {
    requested: Arc<AtomicBool>,
    watch_tx: Arc<watch::Sender<bool>>,
    watch_rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (watch_tx, watch_rx) = watch::channel(false);
        Self {
            requested: Arc::new(AtomicBool::new(false)),
            watch_tx: Arc::new(watch_tx),
            watch_rx,
        }
    }

    /// Ask the loop to stop at its next iteration boundary.
    pub fn request_stop(&self) {
        if self
            .requested
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("stop requested");
            let _ = self.watch_tx.send(true);
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Resolve once a stop has been requested.
    pub async fn wait(&self) {
        let mut rx = self.watch_rx.clone();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Request a stop on `signal` when the process receives SIGINT or SIGTERM.
#[cfg(unix)]
pub async fn stop_on_os_signal(signal: StopSignal) -> Result<()> {
    use tokio::signal::unix::{signal as unix_signal, SignalKind};

    let mut sigterm = unix_signal(SignalKind::terminate())?;
    let mut sigint = unix_signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }

    signal.request_stop();
    Ok(())
}

/// Request a stop on `signal` when the process receives Ctrl+C.
#[cfg(not(unix))]
pub async fn stop_on_os_signal(signal: StopSignal) -> Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C");
    signal.request_stop();
    Ok(())
}
