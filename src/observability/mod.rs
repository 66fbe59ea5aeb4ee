//! Logging and metrics for the thrasher.
//!
//! Logs go through `tracing`; [`init`] installs a subscriber for binaries.
//! Counters and gauges go through the `metrics` facade and are dropped
//! unless the embedding process installs a recorder.

use crate::config::ObservabilityConfig;
use crate::error::{Result, ThrashError};
use metrics::{counter, gauge};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| ThrashError::Internal(format!("Failed to init logging: {}", e)))?;
    } else {
        subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| ThrashError::Internal(format!("Failed to init logging: {}", e)))?;
    }

    info!("Observability initialized");
    Ok(())
}

/// Count one applied thrasher action.
pub fn record_action(action: &'static str) {
    counter!("thrasher_actions_total", "action" => action).increment(1);
}

/// Count one clean-wait started by the injection loop.
pub fn record_clean_wait() {
    counter!("thrasher_clean_waits_total").increment(1);
}

/// Publish the current size of the out and dead sets.
pub fn update_membership(out: usize, dead: usize) {
    gauge!("thrasher_osds_out").set(out as f64);
    gauge!("thrasher_osds_dead").set(dead as f64);
}
