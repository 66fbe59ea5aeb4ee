//! Configuration module for the thrasher harness.
//!
//! Every option has a default, so an empty JSON object is a valid
//! [`ThrashConfig`]. Durations accept either a number of seconds (`5`,
//! `0.5`) or a suffixed string (`"5s"`, `"500ms"`, `"2m"`).

use crate::error::{Result, ThrashError};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::time::Duration;

/// Poll interval used by every convergence wait unless overridden.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Options for the osd thrasher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrashConfig {
    /// Weight of the kill action. Integers above 1 are read as a percent.
    #[serde(deserialize_with = "deserialize_chance")]
    pub chance_down: f64,
    /// Never mark out below this many in osds.
    pub min_in: usize,
    /// Never mark in below this many out osds.
    pub min_out: usize,
    /// Never kill below this many live osds.
    pub min_live: usize,
    /// Never revive below this many dead osds.
    pub min_dead: usize,
    /// Dead osds tolerated when a clean-wait starts; extras are revived first.
    pub max_dead: usize,
    /// Nominal period between clean-waits.
    #[serde(with = "humantime_serde")]
    pub clean_interval: Duration,
    /// Pause between thrash cycles.
    #[serde(with = "humantime_serde")]
    pub op_delay: Duration,
    /// Stagnation timeout for clean-waits. `None` waits forever.
    #[serde(with = "humantime_serde::option")]
    pub timeout: Option<Duration>,
    /// Seed for the action RNG.
    pub seed: Option<u64>,
}

impl Default for ThrashConfig {
    fn default() -> Self {
        Self {
            chance_down: 0.0,
            min_in: 2,
            min_out: 0,
            min_live: 2,
            min_dead: 0,
            max_dead: 0,
            clean_interval: Duration::from_secs(60),
            op_delay: Duration::from_secs(5),
            timeout: None,
            seed: None,
        }
    }
}

impl ThrashConfig {
    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if !self.chance_down.is_finite() || !(0.0..=1.0).contains(&self.chance_down) {
            return Err(ThrashError::InvalidConfig {
                field: "chance_down".to_string(),
                reason: format!("must be within [0, 1], got {}", self.chance_down),
            });
        }

        if self.clean_interval.is_zero() {
            return Err(ThrashError::InvalidConfig {
                field: "clean_interval".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }

        Ok(())
    }

    /// Probability that a given cycle starts with a clean-wait.
    pub fn clean_probability(&self) -> f64 {
        self.op_delay.as_secs_f64() / self.clean_interval.as_secs_f64()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawChance {
    Int(u64),
    Float(f64),
}

fn deserialize_chance<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawChance::deserialize(deserializer)? {
        RawChance::Int(n) if n > 1 => n as f64 / 100.0,
        RawChance::Int(n) => n as f64,
        RawChance::Float(f) => f,
    })
}

/// Options for the monitor clock-skew checker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SkewCheckConfig {
    /// Time between checks. Zero checks back to back.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Largest skew, in seconds, considered tolerable.
    #[serde(alias = "max_skew")]
    pub max_skew: f64,
    /// Whether the run is expected to produce a skew.
    #[serde(alias = "expect_skew")]
    pub expect_skew: bool,
    /// Report expectation mismatches without failing.
    #[serde(alias = "never_fail")]
    pub never_fail: bool,
}

impl Default for SkewCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_skew: 0.05,
            expect_skew: false,
            never_fail: false,
        }
    }
}

/// How the CLI-backed cluster reaches the cluster tool and the daemons.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterCommandConfig {
    /// Program and leading arguments of the cluster tool.
    pub command: Vec<String>,
    /// Shell templates for daemon lifecycle; `{role}` and `{id}` are substituted.
    pub daemons: DaemonCommands,
}

impl Default for ClusterCommandConfig {
    fn default() -> Self {
        Self {
            command: vec!["ceph".to_string()],
            daemons: DaemonCommands::default(),
        }
    }
}

/// Shell templates used to manage daemons.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonCommands {
    pub stop: String,
    pub restart: String,
    /// Must exit zero iff the daemon is running.
    pub status: String,
}

impl Default for DaemonCommands {
    fn default() -> Self {
        Self {
            stop: "systemctl stop ceph-{role}@{id}".to_string(),
            restart: "systemctl restart ceph-{role}@{id}".to_string(),
            status: "systemctl is-active --quiet ceph-{role}@{id}".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level, used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Enable JSON logging.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Top-level configuration of the `thrash` runner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub cluster: ClusterCommandConfig,
    pub thrasher: ThrashConfig,
    /// Run the clock-skew checker alongside the thrasher when present.
    pub skew_check: Option<SkewCheckConfig>,
    /// Number of monitors expected in quorum.
    pub expected_mons: Option<usize>,
    /// Poll interval for convergence waits.
    #[serde(with = "humantime_serde::option")]
    pub poll_interval: Option<Duration>,
    pub observability: ObservabilityConfig,
}

impl HarnessConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ThrashError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| ThrashError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        self.thrasher.validate()?;

        if self.cluster.command.is_empty() {
            return Err(ThrashError::InvalidConfig {
                field: "cluster.command".to_string(),
                reason: "cluster command must name a program".to_string(),
            });
        }

        if self.skew_check.is_some() && self.expected_mons.unwrap_or(0) == 0 {
            return Err(ThrashError::InvalidConfig {
                field: "expected_mons".to_string(),
                reason: "the skew check needs the expected quorum size".to_string(),
            });
        }

        if let Some(skew) = &self.skew_check {
            if !skew.max_skew.is_finite() || skew.max_skew < 0.0 {
                return Err(ThrashError::InvalidConfig {
                    field: "skew_check.max-skew".to_string(),
                    reason: "must be a non-negative number of seconds".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL)
    }
}

/// Serde helper for durations given as seconds or as suffixed strings.
pub mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(f64),
        Text(String),
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => from_secs(secs).map_err(serde::de::Error::custom),
            Raw::Text(s) => parse_duration(&s).map_err(serde::de::Error::custom),
        }
    }

    fn from_secs(secs: f64) -> Result<Duration, String> {
        Duration::try_from_secs_f64(secs).map_err(|e| format!("{}: {}", secs, e))
    }

    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        } else if let Some(s_val) = s.strip_suffix('s') {
            s_val
                .parse::<f64>()
                .map_err(|e| e.to_string())
                .and_then(from_secs)
        } else if let Some(m) = s.strip_suffix('m') {
            m.parse::<u64>()
                .map_err(|e| e.to_string())
                .and_then(|v| {
                    v.checked_mul(60)
                        .map(Duration::from_secs)
                        .ok_or_else(|| format!("duration out of range: {}", s))
                })
        } else {
            s.parse::<f64>()
                .map_err(|e| e.to_string())
                .and_then(from_secs)
        }
    }

    /// Same encoding for `Option<Duration>`; `null` means unset.
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            #[derive(Deserialize)]
            struct Wrapper(#[serde(with = "super")] Duration);

            let value = Option::<Wrapper>::deserialize(deserializer)?;
            Ok(value.map(|Wrapper(d)| d))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thrash_defaults() {
        let config = ThrashConfig::default();
        assert_eq!(config.chance_down, 0.0);
        assert_eq!(config.min_in, 2);
        assert_eq!(config.min_live, 2);
        assert_eq!(config.clean_interval, Duration::from_secs(60));
        assert_eq!(config.op_delay, Duration::from_secs(5));
        assert!(config.timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: ThrashConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.min_in, 2);
        assert_eq!(config.max_dead, 0);
    }

    #[test]
    fn test_chance_down_percent() {
        let config: ThrashConfig = serde_json::from_str(r#"{"chance_down": 30}"#).unwrap();
        assert!((config.chance_down - 0.3).abs() < f64::EPSILON);

        let config: ThrashConfig = serde_json::from_str(r#"{"chance_down": 0.75}"#).unwrap();
        assert!((config.chance_down - 0.75).abs() < f64::EPSILON);

        let config: ThrashConfig = serde_json::from_str(r#"{"chance_down": 1}"#).unwrap();
        assert_eq!(config.chance_down, 1.0);
    }

    #[test]
    fn test_durations_in_seconds_and_strings() {
        let config: ThrashConfig =
            serde_json::from_str(r#"{"op_delay": 1, "clean_interval": "4s", "timeout": "500ms"}"#)
                .unwrap();
        assert_eq!(config.op_delay, Duration::from_secs(1));
        assert_eq!(config.clean_interval, Duration::from_secs(4));
        assert_eq!(config.timeout, Some(Duration::from_millis(500)));
        assert!((config.clean_probability() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_null_timeout() {
        let config: ThrashConfig = serde_json::from_str(r#"{"timeout": null}"#).unwrap();
        assert!(config.timeout.is_none());
    }

    #[test]
    fn test_invalid_chance() {
        let config = ThrashConfig {
            chance_down: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_clean_interval_rejected() {
        let config = ThrashConfig {
            clean_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_skew_config_kebab_case() {
        let config: SkewCheckConfig =
            serde_json::from_str(r#"{"max-skew": 0.1, "expect-skew": true, "interval": 0}"#)
                .unwrap();
        assert!((config.max_skew - 0.1).abs() < f64::EPSILON);
        assert!(config.expect_skew);
        assert!(!config.never_fail);
        assert_eq!(config.interval, Duration::ZERO);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(
            humantime_serde::parse_duration("2m").unwrap(),
            Duration::from_secs(120)
        );
        assert_eq!(
            humantime_serde::parse_duration("1.5s").unwrap(),
            Duration::from_millis(1500)
        );
        assert!(humantime_serde::parse_duration("soon").is_err());
    }

    #[test]
    fn test_parse_duration_minutes_overflow() {
        let err = humantime_serde::parse_duration("307445734561825861m").unwrap_err();
        assert!(err.contains("out of range"));
        assert_eq!(
            humantime_serde::parse_duration("307445734561825860m").unwrap(),
            Duration::from_secs(307445734561825860 * 60)
        );
    }

    #[test]
    fn test_harness_requires_mons_for_skew() {
        let config = HarnessConfig {
            skew_check: Some(SkewCheckConfig::default()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = HarnessConfig {
            skew_check: Some(SkewCheckConfig::default()),
            expected_mons: Some(3),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_interval(), DEFAULT_POLL_INTERVAL);
    }
}
