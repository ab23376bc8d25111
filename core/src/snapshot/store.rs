use crate::engine::CountingEngine;
use crate::prelude::{EngineError, EngineResult};
use crate::snapshot::EngineSnapshot;
use crate::telemetry::LogManager;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Filesystem-backed snapshot reader/writer.
///
/// Writes go to a temp file first and are renamed into place so a crash
/// mid-write never truncates the previous snapshot.
#[derive(Clone)]
pub struct SnapshotStore {
    path: PathBuf,
    logger: LogManager,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            logger: LogManager::scoped("snapshot"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `Ok(None)` when no snapshot file exists yet.
    pub fn load(&self) -> EngineResult<Option<EngineSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)
            .map_err(|err| EngineError::SnapshotCorrupt(format!("{}: {}", self.path.display(), err)))?;
        let snapshot = serde_json::from_str(&contents)
            .map_err(|err| EngineError::SnapshotCorrupt(format!("{}: {}", self.path.display(), err)))?;
        Ok(Some(snapshot))
    }

    /// Degrades to an empty snapshot on a missing or corrupt file; a bad
    /// snapshot is an operator-visible condition, never a startup failure.
    pub fn load_or_default(&self) -> EngineSnapshot {
        match self.load() {
            Ok(Some(snapshot)) => {
                self.logger.record(&format!(
                    "restored {} zones across {} sources from {}",
                    snapshot.zone_count(),
                    snapshot.sources.len(),
                    self.path.display()
                ));
                snapshot
            }
            Ok(None) => {
                self.logger
                    .record(&format!("no prior snapshot at {}", self.path.display()));
                EngineSnapshot::default()
            }
            Err(err) => {
                self.logger
                    .alert(&format!("starting with empty state: {}", err));
                EngineSnapshot::default()
            }
        }
    }

    pub fn save(&self, snapshot: &EngineSnapshot) -> EngineResult<()> {
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|err| EngineError::SnapshotWriteFailed(err.to_string()))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|err| EngineError::SnapshotWriteFailed(err.to_string()))?;
            }
        }
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, json)
            .map_err(|err| EngineError::SnapshotWriteFailed(err.to_string()))?;
        fs::rename(&staging, &self.path)
            .map_err(|err| EngineError::SnapshotWriteFailed(err.to_string()))?;
        Ok(())
    }

    /// Timer-driven persistence off the hot detection path. A failed
    /// write is logged and retried on the next interval.
    pub fn spawn_periodic(self, engine: Arc<CountingEngine>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            tick.tick().await;
            loop {
                tick.tick().await;
                let snapshot = engine.snapshot().await;
                match self.save(&snapshot) {
                    Ok(()) => self.logger.record(&format!(
                        "wrote {} zones to {}",
                        snapshot.zone_count(),
                        self.path.display()
                    )),
                    Err(err) => self.logger.alert(&format!("{}", err)),
                }
            }
        })
    }
}
