use serde::Serialize;
use std::sync::Mutex;

/// Aggregate counters exposed for health reporting.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MetricsSnapshot {
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub commands_processed: u64,
    pub forced_exits: u64,
    pub errors: u64,
}

/// Engine-wide metrics recorder shared by all source actors.
///
/// Dropped frames are absorbed silently on the ingest path, so this is
/// the only place they remain observable.
pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    pub fn record_frame(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.frames_processed += 1;
        }
    }

    pub fn record_dropped_frame(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.frames_dropped += 1;
        }
    }

    pub fn record_command(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.commands_processed += 1;
        }
    }

    pub fn record_forced_exit(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.forced_exits += 1;
        }
    }

    pub fn record_error(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.errors += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().map(|metrics| *metrics).unwrap_or_default()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
