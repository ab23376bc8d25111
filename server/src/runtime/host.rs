use crate::runtime::config::EngineSettings;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use zonecore::engine::CountingEngine;
use zonecore::snapshot::SnapshotStore;
use zonecore::telemetry::LogManager;

/// Owns the engine instance, its snapshot store, and the periodic
/// persistence task for one process lifetime.
pub struct EngineHost {
    engine: Arc<CountingEngine>,
    store: SnapshotStore,
    snapshot_task: JoinHandle<()>,
    logger: LogManager,
}

impl EngineHost {
    /// Builds the engine and restores any prior snapshot before a single
    /// detection can be accepted, so counts survive process restarts.
    pub async fn start(settings: &EngineSettings) -> anyhow::Result<Self> {
        let store = SnapshotStore::new(settings.snapshot_path.clone());
        let engine = Arc::new(CountingEngine::new(
            settings.to_counting_config(),
            settings.default_zones.clone(),
        ));

        let restored = store.load_or_default();
        if !restored.is_empty() {
            engine.restore(restored).await;
        }

        let snapshot_task = store.clone().spawn_periodic(
            engine.clone(),
            Duration::from_secs(settings.snapshot_interval_secs.max(1)),
        );

        Ok(Self {
            engine,
            store,
            snapshot_task,
            logger: LogManager::scoped("host"),
        })
    }

    pub fn engine(&self) -> Arc<CountingEngine> {
        self.engine.clone()
    }

    /// Drains every source and writes the final snapshot.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.snapshot_task.abort();
        let snapshot = self.engine.shutdown().await;
        self.store
            .save(&snapshot)
            .context("writing final snapshot")?;
        self.logger
            .record(&format!("final snapshot: {} zones", snapshot.zone_count()));
        Ok(())
    }
}
