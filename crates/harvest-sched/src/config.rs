//! Orchestrator configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SchedError, SchedResult};

/// Upper bound for the sweep windows: ten years.
pub const MAX_WINDOW_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Tunables for the orchestrator loop, runners and sweeps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Seconds between orchestrator polls.
    pub check_interval_secs: u64,
    /// Collections fetched per poll.
    pub poll_batch_size: usize,
    /// Collection runners allowed at once.
    pub max_concurrent_collections: usize,
    /// Week executions allowed at once, across all collections.
    pub max_concurrent_weeks: usize,
    /// Minimum spacing between workflow calls, process-wide.
    pub min_call_spacing_ms: u64,
    /// Week failures in one run that fail the collection.
    pub failure_threshold: u32,
    /// Automatic retries per collection.
    pub max_retries: u32,
    /// A failed collection is retried only if it failed this recently.
    pub retry_window_secs: u64,
    /// A running collection untouched for this long is abandoned.
    pub abandoned_after_secs: u64,
    /// Seconds between abandoned sweeps.
    pub abandoned_sweep_interval_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 30,
            poll_batch_size: 10,
            max_concurrent_collections: 5,
            max_concurrent_weeks: 10,
            min_call_spacing_ms: 2_000,
            failure_threshold: 3,
            max_retries: 3,
            retry_window_secs: 5 * 60,
            abandoned_after_secs: 24 * 60 * 60,
            abandoned_sweep_interval_secs: 60 * 60,
        }
    }
}

impl OrchestratorConfig {
    /// Load a configuration from a YAML file. Missing keys keep their defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> SchedResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml_ng::from_str(&text)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded orchestrator config");
        Ok(config)
    }

    /// Reject settings the orchestrator cannot run with.
    pub fn validate(&self) -> SchedResult<()> {
        let checks = [
            (self.check_interval_secs == 0, "check_interval_secs must be positive"),
            (self.poll_batch_size == 0, "poll_batch_size must be positive"),
            (
                self.max_concurrent_collections == 0,
                "max_concurrent_collections must be positive",
            ),
            (
                self.max_concurrent_weeks == 0,
                "max_concurrent_weeks must be positive",
            ),
            (self.failure_threshold == 0, "failure_threshold must be positive"),
            (
                self.abandoned_sweep_interval_secs == 0,
                "abandoned_sweep_interval_secs must be positive",
            ),
            (
                self.retry_window_secs > MAX_WINDOW_SECS,
                "retry_window_secs must be at most ten years",
            ),
            (
                self.abandoned_after_secs > MAX_WINDOW_SECS,
                "abandoned_after_secs must be at most ten years",
            ),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(SchedError::ConfigError((*message).to_string())),
            None => Ok(()),
        }
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn min_call_spacing(&self) -> Duration {
        Duration::from_millis(self.min_call_spacing_ms)
    }

    pub fn retry_window(&self) -> chrono::Duration {
        window(self.retry_window_secs)
    }

    pub fn abandoned_after(&self) -> chrono::Duration {
        window(self.abandoned_after_secs)
    }

    pub fn abandoned_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.abandoned_sweep_interval_secs)
    }
}

/// Saturates instead of panicking on values `validate` would reject.
fn window(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}
