//! Replay configuration.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Verbosity of the replay, mapped onto the tracing filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only data problems and failures
    Error,
    /// Day-level progress
    #[default]
    Info,
    /// Per-message engine activity
    Debug,
}

impl LogLevel {
    /// Directive string for `tracing_subscriber::EnvFilter`.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

/// Options recognized by the replay driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Seconds between depth snapshots; `None` disables snapshot output
    pub snapshot_interval_secs: Option<u64>,
    /// Levels per side in each snapshot row
    pub snapshot_depth: usize,
    /// Log verbosity
    pub log_level: LogLevel,
    /// Instant up to which exits are swept once after the last message, so
    /// a terminal snapshot can be taken past the final tape entry
    #[serde(with = "crate::utils::serde_dtm_opt")]
    pub cancel_sweep_limit: Option<NaiveDateTime>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            snapshot_interval_secs: None,
            snapshot_depth: 10,
            log_level: LogLevel::default(),
            cancel_sweep_limit: None,
        }
    }
}
