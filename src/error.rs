//! Error types for the thrasher and its convergence waits.
//!
//! This module provides a unified error type [`ThrashError`] for every
//! operation in the crate, along with a convenient [`Result`] alias.
//!
//! # Error Categories
//!
//! - **Convergence**: a wait exceeded its timeout policy
//! - **Contract**: the cluster reported something the thrasher cannot reconcile
//!   with its membership view
//! - **Cluster commands**: a remote command or daemon operation failed
//! - **Configuration**: invalid settings or unreadable config files
//!
//! None of these are retried. A cluster that cannot converge, or that
//! contradicts the thrasher's bookkeeping, is itself the test failure.
//!
//! # Example
//!
//! ```rust
//! use osd_thrasher::error::{Result, ThrashError};
//! use std::time::Duration;
//!
//! fn check(elapsed: Duration) -> Result<()> {
//!     if elapsed > Duration::from_secs(10) {
//!         return Err(ThrashError::Timeout {
//!             what: "quorum size 3".into(),
//!             elapsed,
//!         });
//!     }
//!     Ok(())
//! }
//!
//! assert!(check(Duration::from_secs(11)).unwrap_err().is_timeout());
//! ```

use crate::types::OsdId;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Main error type for thrasher operations.
#[derive(Error, Debug)]
pub enum ThrashError {
    // Convergence errors
    #[error("Timed out after {elapsed:?} waiting for {what}")]
    Timeout { what: String, elapsed: Duration },

    // Contract errors
    #[error("Cluster contract violation: {0}")]
    ContractViolation(String),

    #[error("osd.{0} is not tracked by the thrasher")]
    UnknownOsd(OsdId),

    #[error("mon.{0} is not part of the cluster")]
    UnknownMon(String),

    #[error("No osd available to {0}")]
    NoCandidate(String),

    // Cluster command errors
    #[error("Command `{command}` exited with {status}: {stderr}")]
    Command {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("Failed to parse cluster output: {0}")]
    Parse(String),

    #[error("Daemon operation failed: {0}")]
    Daemon(String),

    // Checker errors
    #[error("Clock skew expectation failed: {0}")]
    SkewExpectation(String),

    #[error("Mon health check failed: {0}")]
    MonHealth(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // External errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ThrashError {
    /// Check if the error came from a convergence wait running out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ThrashError::Timeout { .. })
    }

    /// Check if the cluster contradicted the thrasher's membership view.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            ThrashError::ContractViolation(_) | ThrashError::UnknownOsd(_)
        )
    }
}

impl From<tokio::task::JoinError> for ThrashError {
    fn from(e: tokio::task::JoinError) -> Self {
        ThrashError::Internal(format!("background task failed: {}", e))
    }
}

/// Result type alias for thrasher operations.
pub type Result<T> = std::result::Result<T, ThrashError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classification() {
        let err = ThrashError::Timeout {
            what: "clean".into(),
            elapsed: Duration::from_secs(4),
        };
        assert!(err.is_timeout());
        assert!(!err.is_contract_violation());
        assert!(err.to_string().contains("clean"));
    }

    #[test]
    fn test_contract_classification() {
        assert!(ThrashError::UnknownOsd(3).is_contract_violation());
        assert!(ThrashError::ContractViolation("osd.1 in both".into()).is_contract_violation());
        assert!(!ThrashError::Config("bad".into()).is_contract_violation());
    }

    #[test]
    fn test_command_display() {
        let err = ThrashError::Command {
            command: "ceph osd out 1".into(),
            status: 22,
            stderr: "EINVAL".into(),
        };
        assert_eq!(
            err.to_string(),
            "Command `ceph osd out 1` exited with 22: EINVAL"
        );
    }
}
