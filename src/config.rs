//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::truncation::TruncationPolicy;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum number of prior conversation turns in the transcript.
    pub history_limit: usize,
    /// Token ceiling for the stage-1 (grounded) generation call.
    pub step1_max_tokens: u32,
    /// Token ceiling for the stage-2 extraction call.
    pub step2_max_tokens: u32,
    /// Per-network-call timeout. Applied to each awaited call individually
    /// so a hung call still produces a complete, persisted record.
    pub call_timeout: Duration,
    /// Truncation guard thresholds.
    pub truncation: TruncationPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            history_limit: 100,
            step1_max_tokens: 2048,
            step2_max_tokens: 1024,
            call_timeout: Duration::from_secs(120),
            truncation: TruncationPolicy::default(),
        }
    }
}

/// Execution log store configuration.
#[derive(Debug, Clone)]
pub struct LogStoreConfig {
    /// Directory holding execution records, history files and manifests.
    pub logs_dir: PathBuf,
    /// Entry count at which the primary history file rotates.
    pub max_history_entries: usize,
}

impl Default for LogStoreConfig {
    fn default() -> Self {
        Self {
            logs_dir: PathBuf::from("./data/logs"),
            max_history_entries: 200,
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often the cron ticker checks for due automations.
    pub tick_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(30),
        }
    }
}

impl LogStoreConfig {
    /// Build from environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            logs_dir: std::env::var("AUTOPOST_LOGS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.logs_dir),
            max_history_entries: std::env::var("AUTOPOST_MAX_HISTORY_ENTRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_history_entries),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.history_limit, 100);
        assert_eq!(config.step1_max_tokens, 2048);
    }

    #[test]
    fn log_store_defaults() {
        let config = LogStoreConfig::default();
        assert_eq!(config.max_history_entries, 200);
    }
}
