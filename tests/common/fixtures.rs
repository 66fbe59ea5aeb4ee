//! Test fixtures: configurations, clusters and config files.

use osd_thrasher::cluster::SimCluster;
use osd_thrasher::config::ThrashConfig;
use osd_thrasher::types::PgCounts;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Fast-cycling thrasher configuration with a fixed seed.
pub fn fast_config(chance_down: f64) -> ThrashConfig {
    ThrashConfig {
        chance_down,
        min_in: 2,
        min_live: 2,
        op_delay: Duration::from_secs(1),
        clean_interval: Duration::from_secs(4),
        seed: Some(7),
        ..ThrashConfig::default()
    }
}

/// Simulated cluster with `osds` osds and three monitors.
pub fn sim_cluster(osds: u32) -> Arc<SimCluster> {
    Arc::new(SimCluster::new(osds, 3))
}

pub fn clean(total: u64) -> PgCounts {
    PgCounts {
        total,
        active_clean: total,
        active: total,
    }
}

/// Active but not clean.
pub fn recovering(total: u64, active_clean: u64) -> PgCounts {
    PgCounts {
        total,
        active_clean,
        active: total,
    }
}

/// Temporary directory for config files.
pub struct ConfigDir {
    pub temp_dir: TempDir,
}

impl ConfigDir {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Write `contents` to `name` and return its path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, contents).expect("Failed to write config file");
        path
    }
}

impl Default for ConfigDir {
    fn default() -> Self {
        Self::new()
    }
}
