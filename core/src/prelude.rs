use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shared tuning knobs for the counting engine.
///
/// `min_dwell_ms` and `exit_grace_ms` are operational policy: a candidate
/// boundary crossing must hold for `min_dwell_ms` before it commits
/// (`0` disables debouncing and makes the literal per-frame transition
/// the contract), and an occupant absent from input for longer than
/// `exit_grace_ms` is force-exited (`0` disables the sweep).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CountingConfig {
    pub min_dwell_ms: u64,
    pub exit_grace_ms: u64,
    pub history_cap: usize,
    pub frame_queue_cap: usize,
    pub command_queue_cap: usize,
    pub command_timeout_ms: u64,
}

impl Default for CountingConfig {
    fn default() -> Self {
        Self {
            min_dwell_ms: 300,
            exit_grace_ms: 1_000,
            history_cap: 256,
            frame_queue_cap: 8,
            command_queue_cap: 32,
            command_timeout_ms: 1_000,
        }
    }
}

impl CountingConfig {
    pub fn min_dwell(&self) -> Option<Duration> {
        if self.min_dwell_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.min_dwell_ms))
        }
    }

    pub fn exit_grace(&self) -> Option<Duration> {
        if self.exit_grace_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.exit_grace_ms))
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms.max(1))
    }
}

/// Common error type for engine operations.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("unknown source: {0}")]
    UnknownSource(String),
    #[error("unknown zone {zone_id} for source {source_id}")]
    UnknownZone { source_id: String, zone_id: String },
    #[error("invalid boundary: {0}")]
    InvalidBoundary(String),
    #[error("busy: {0}")]
    Busy(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("snapshot unreadable: {0}")]
    SnapshotCorrupt(String),
    #[error("snapshot write failed: {0}")]
    SnapshotWriteFailed(String),
    #[error("internal failure: {0}")]
    Internal(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_durations_disable_policies() {
        let config = CountingConfig {
            min_dwell_ms: 0,
            exit_grace_ms: 0,
            ..Default::default()
        };
        assert!(config.min_dwell().is_none());
        assert!(config.exit_grace().is_none());
    }

    #[test]
    fn default_config_enables_both_policies() {
        let config = CountingConfig::default();
        assert_eq!(config.min_dwell(), Some(Duration::from_millis(300)));
        assert_eq!(config.exit_grace(), Some(Duration::from_millis(1_000)));
    }
}
