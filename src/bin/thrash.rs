//! Thrasher runner binary.

use clap::Parser;
use osd_thrasher::config::{humantime_serde, HarnessConfig};
use osd_thrasher::stop::{stop_on_os_signal, StopSignal};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "thrash")]
#[command(about = "Inject osd faults into a running storage cluster")]
struct Args {
    /// Configuration file (JSON)
    #[arg(short, long, env = "THRASH_CONFIG")]
    config: Option<PathBuf>,

    /// How long to thrash, e.g. "10m" or "90s". Runs until Ctrl-C when unset.
    #[arg(short, long, value_parser = parse_duration)]
    duration: Option<Duration>,

    /// Seed for the action rng
    #[arg(long, env = "THRASH_SEED")]
    seed: Option<u64>,

    /// Log level
    #[arg(long, env = "THRASH_LOG_LEVEL")]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime_serde::parse_duration(s)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match args.config {
        Some(path) => HarnessConfig::from_file(&path)?,
        None => HarnessConfig::default(),
    };

    // Override with CLI args
    if let Some(seed) = args.seed {
        config.thrasher.seed = Some(seed);
    }
    if let Some(level) = args.log_level {
        config.observability.log_level = level;
    }
    if args.json_logs {
        config.observability.json_logs = true;
    }

    osd_thrasher::observability::init(&config.observability)?;

    let stop = StopSignal::new();
    let signal_stop = stop.clone();
    tokio::spawn(async move {
        if let Err(e) = stop_on_os_signal(signal_stop).await {
            error!(error = %e, "failed to install signal handler");
        }
    });

    let summary = osd_thrasher::run(config, args.duration, stop).await?;
    info!(actions = summary.history.len(), "thrash run complete");
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
