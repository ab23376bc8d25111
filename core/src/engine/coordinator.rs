use crate::counting::{CountUpdate, ZoneStateView, ZoneTable};
use crate::engine::actor::SourceActor;
use crate::engine::mailbox::{FramePush, Mailbox};
use crate::engine::messages::{
    apply_to_table, CommandOutcome, ControlCommand, SourcePhase, ZoneSeed,
};
use crate::ingest::DetectionFrame;
use crate::prelude::{CountingConfig, EngineError, EngineResult};
use crate::snapshot::EngineSnapshot;
use crate::telemetry::{LogManager, MetricsRecorder, MetricsSnapshot};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, oneshot, RwLock};
use tokio::task::JoinHandle;

/// Broadcast capacity for count-change notifications.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Registry slot for one source. While an actor runs it owns the zone
/// table; once it stops the table is parked in `retained` so history
/// survives a transient pipeline restart.
struct SourceEntry {
    phase: SourcePhase,
    mailbox: Option<Arc<Mailbox>>,
    join: Option<JoinHandle<ZoneTable>>,
    retained: Option<ZoneTable>,
}

impl SourceEntry {
    fn idle(table: ZoneTable) -> Self {
        Self {
            phase: SourcePhase::Idle,
            mailbox: None,
            join: None,
            retained: Some(table),
        }
    }
}

/// Coordinator owning one serialized actor per registered source.
///
/// Routes detection frames and control commands by source id, fans out
/// count events over a broadcast channel, and assembles cross-source
/// snapshots. `query_all` is consistent per source but may compose
/// slightly different logical times across sources; that skew is an
/// accepted property of lock-free cross-actor queries.
pub struct CountingEngine {
    config: CountingConfig,
    default_zones: Vec<ZoneSeed>,
    sources: RwLock<HashMap<String, SourceEntry>>,
    event_tx: broadcast::Sender<CountUpdate>,
    metrics: Arc<MetricsRecorder>,
    active_source: std::sync::Mutex<Option<String>>,
    logger: LogManager,
}

impl CountingEngine {
    pub fn new(config: CountingConfig, default_zones: Vec<ZoneSeed>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            default_zones,
            sources: RwLock::new(HashMap::new()),
            event_tx,
            metrics: Arc::new(MetricsRecorder::new()),
            active_source: std::sync::Mutex::new(None),
            logger: LogManager::scoped("engine"),
        }
    }

    /// Subscribe to count-change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<CountUpdate> {
        self.event_tx.subscribe()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Creates and starts an actor for the source if none is running.
    /// Idempotent for a running source; a previously stopped source gets
    /// a fresh actor seeded from its retained zones.
    pub async fn register_source(&self, source_id: &str) -> EngineResult<()> {
        use std::collections::hash_map::Entry;

        let mut sources = self.sources.write().await;
        let entry = match sources.entry(source_id.to_string()) {
            Entry::Occupied(occupied) => occupied.into_mut(),
            Entry::Vacant(vacant) => {
                let mut table = ZoneTable::new(source_id, self.config.clone());
                for seed in &self.default_zones {
                    if let Err(err) = table.create_or_update(&seed.zone_id, seed.boundary.clone())
                    {
                        self.logger
                            .alert(&format!("default zone {} rejected: {}", seed.zone_id, err));
                    }
                }
                vacant.insert(SourceEntry::idle(table))
            }
        };

        match entry.phase {
            SourcePhase::Running => Ok(()),
            SourcePhase::Draining => Err(EngineError::Busy(format!(
                "source {} is draining",
                source_id
            ))),
            SourcePhase::Idle | SourcePhase::Stopped => {
                let table = entry
                    .retained
                    .take()
                    .unwrap_or_else(|| ZoneTable::new(source_id, self.config.clone()));
                let mailbox = Arc::new(Mailbox::new(&self.config));
                let join = SourceActor::spawn(
                    table,
                    mailbox.clone(),
                    self.event_tx.clone(),
                    self.metrics.clone(),
                );
                entry.phase = SourcePhase::Running;
                entry.mailbox = Some(mailbox);
                entry.join = Some(join);
                self.logger.record(&format!("source {} running", source_id));
                Ok(())
            }
        }
    }

    /// Drains the source's actor: queued frames are discarded, the
    /// command backlog is answered, and the zone table is retained
    /// read-only until deletion or re-registration.
    pub async fn unregister_source(&self, source_id: &str) -> EngineResult<()> {
        let (mailbox, join) = {
            let mut sources = self.sources.write().await;
            let entry = sources
                .get_mut(source_id)
                .ok_or_else(|| EngineError::UnknownSource(source_id.to_string()))?;
            match entry.phase {
                SourcePhase::Running => {
                    entry.phase = SourcePhase::Draining;
                    (entry.mailbox.take(), entry.join.take())
                }
                _ => return Ok(()),
            }
        };

        if let Some(mailbox) = &mailbox {
            mailbox.drain();
        }
        let table = match join {
            Some(join) => join.await.ok(),
            None => None,
        };

        let mut sources = self.sources.write().await;
        if let Some(entry) = sources.get_mut(source_id) {
            entry.phase = SourcePhase::Stopped;
            if table.is_none() {
                self.logger
                    .alert(&format!("actor for {} ended without its table", source_id));
            }
            entry.retained = table;
        }
        self.logger
            .record(&format!("source {} stopped, zones retained", source_id));
        Ok(())
    }

    /// Enqueues one detection frame. `UnknownSource` if the source was
    /// never registered or restored; frames for a known but inactive
    /// source are absorbed and counted as dropped.
    pub async fn submit_detections(&self, frame: DetectionFrame) -> EngineResult<()> {
        let sources = self.sources.read().await;
        let entry = sources
            .get(&frame.source_id)
            .ok_or_else(|| EngineError::UnknownSource(frame.source_id.clone()))?;
        match (&entry.phase, &entry.mailbox) {
            (SourcePhase::Running, Some(mailbox)) => match mailbox.push_frame(frame) {
                FramePush::Accepted => Ok(()),
                FramePush::ReplacedOldest | FramePush::Discarded => {
                    self.metrics.record_dropped_frame();
                    Ok(())
                }
            },
            _ => {
                self.metrics.record_dropped_frame();
                Ok(())
            }
        }
    }

    /// Routes a control command to its source and waits for the ordered
    /// result. Zones of an inactive source stay editable: with no live
    /// actor the registry lock is the single writer.
    pub async fn apply_command(
        &self,
        source_id: &str,
        op: ControlCommand,
    ) -> EngineResult<CommandOutcome> {
        let mailbox = {
            let sources = self.sources.read().await;
            let entry = sources
                .get(source_id)
                .ok_or_else(|| EngineError::UnknownSource(source_id.to_string()))?;
            match entry.phase {
                SourcePhase::Running => entry.mailbox.clone(),
                SourcePhase::Draining => {
                    return Err(EngineError::Busy(format!(
                        "source {} is draining",
                        source_id
                    )))
                }
                SourcePhase::Idle | SourcePhase::Stopped => None,
            }
        };

        match mailbox {
            Some(mailbox) => self.send_command(source_id, &mailbox, op).await,
            None => self.apply_retained(source_id, op).await,
        }
    }

    async fn send_command(
        &self,
        source_id: &str,
        mailbox: &Mailbox,
        op: ControlCommand,
    ) -> EngineResult<CommandOutcome> {
        let (reply_tx, reply_rx) = oneshot::channel();
        mailbox.push_command(op, reply_tx)?;
        match tokio::time::timeout(self.config.command_timeout(), reply_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(EngineError::Busy(format!(
                "actor for {} stopped before replying",
                source_id
            ))),
            Err(_) => Err(EngineError::Timeout(format!(
                "command for source {} not answered within {} ms",
                source_id, self.config.command_timeout_ms
            ))),
        }
    }

    async fn apply_retained(
        &self,
        source_id: &str,
        op: ControlCommand,
    ) -> EngineResult<CommandOutcome> {
        let mut sources = self.sources.write().await;
        let entry = sources
            .get_mut(source_id)
            .ok_or_else(|| EngineError::UnknownSource(source_id.to_string()))?;

        // The source may have been re-registered while we swapped locks.
        if entry.phase == SourcePhase::Running {
            if let Some(mailbox) = entry.mailbox.clone() {
                drop(sources);
                return self.send_command(source_id, &mailbox, op).await;
            }
        }

        self.metrics.record_command();
        let table = entry.retained.as_mut().ok_or_else(|| {
            EngineError::Internal(format!("no retained state for source {}", source_id))
        })?;
        let outcome = apply_to_table(table, op);
        if outcome.is_err() {
            self.metrics.record_error();
        }
        outcome
    }

    /// Aggregate state across every known source, live or retained.
    pub async fn query_all(&self) -> Vec<ZoneStateView> {
        let mut views = Vec::new();
        let live: Vec<(String, Arc<Mailbox>)> = {
            let sources = self.sources.read().await;
            let mut live = Vec::new();
            for (source_id, entry) in sources.iter() {
                if let (SourcePhase::Running, Some(mailbox)) = (entry.phase, &entry.mailbox) {
                    live.push((source_id.clone(), mailbox.clone()));
                } else if let Some(table) = &entry.retained {
                    views.extend(table.views());
                }
            }
            live
        };

        for (source_id, mailbox) in live {
            match self
                .send_command(&source_id, &mailbox, ControlCommand::QueryState)
                .await
            {
                Ok(CommandOutcome::Source(zone_views)) => views.extend(zone_views),
                Ok(_) => {}
                Err(err) => self
                    .logger
                    .alert(&format!("state query for {} failed: {}", source_id, err)),
            }
        }

        views.sort_by(|a, b| {
            a.source_id
                .cmp(&b.source_id)
                .then_with(|| a.zone_id.cmp(&b.zone_id))
        });
        views
    }

    pub async fn source_phases(&self) -> BTreeMap<String, SourcePhase> {
        self.sources
            .read()
            .await
            .iter()
            .map(|(source_id, entry)| (source_id.clone(), entry.phase))
            .collect()
    }

    /// Display-routing hint for the web layer; no counting semantics.
    pub async fn set_active_source(&self, source_id: &str) -> EngineResult<()> {
        {
            let sources = self.sources.read().await;
            if !sources.contains_key(source_id) {
                return Err(EngineError::UnknownSource(source_id.to_string()));
            }
        }
        if let Ok(mut active) = self.active_source.lock() {
            *active = Some(source_id.to_string());
        }
        Ok(())
    }

    pub fn active_source(&self) -> Option<String> {
        self.active_source
            .lock()
            .ok()
            .and_then(|active| active.clone())
    }

    pub async fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot::from_views(self.query_all().await)
    }

    /// Installs persisted state. Call before any pipeline registers;
    /// sources already present are left untouched.
    pub async fn restore(&self, snapshot: EngineSnapshot) {
        let now = Instant::now();
        let mut sources = self.sources.write().await;
        for (source_id, zones) in snapshot.sources {
            if sources.contains_key(&source_id) {
                self.logger.alert(&format!(
                    "source {} already present, skipping restore",
                    source_id
                ));
                continue;
            }
            let table =
                ZoneTable::from_snapshot(source_id.clone(), self.config.clone(), zones, now);
            sources.insert(source_id, SourceEntry::idle(table));
        }
    }

    /// Drains every actor and returns the final state for persistence.
    pub async fn shutdown(&self) -> EngineSnapshot {
        let source_ids: Vec<String> = {
            self.sources.read().await.keys().cloned().collect()
        };
        for source_id in source_ids {
            if let Err(err) = self.unregister_source(&source_id).await {
                self.logger
                    .alert(&format!("drain of {} failed: {}", source_id, err));
            }
        }

        let sources = self.sources.read().await;
        let mut views = Vec::new();
        for entry in sources.values() {
            if let Some(table) = &entry.retained {
                views.extend(table.views());
            }
        }
        EngineSnapshot::from_views(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counting::Direction;
    use crate::geometry::{Boundary, Point};
    use crate::ingest::Detection;
    use std::time::Duration;

    fn immediate() -> CountingConfig {
        CountingConfig {
            min_dwell_ms: 0,
            exit_grace_ms: 0,
            ..Default::default()
        }
    }

    fn zone1() -> Boundary {
        Boundary::rectangle(Point::new(640.0, 360.0), Point::new(1280.0, 700.0))
    }

    fn create_zone1() -> ControlCommand {
        ControlCommand::CreateOrUpdateZone {
            zone_id: "zone1".to_string(),
            boundary: zone1(),
        }
    }

    fn inside_frame(ts: f64, track_id: u64) -> DetectionFrame {
        DetectionFrame::new("camera1", ts, vec![Detection::new(track_id, 900.0, 500.0)])
    }

    async fn zone_view(engine: &CountingEngine, source_id: &str) -> Vec<ZoneStateView> {
        match engine
            .apply_command(source_id, ControlCommand::QueryState)
            .await
            .unwrap()
        {
            CommandOutcome::Source(views) => views,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_source_is_rejected_without_side_effects() {
        let engine = CountingEngine::new(immediate(), Vec::new());
        let err = engine
            .submit_detections(inside_frame(1.0, 7))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownSource(_)));
        assert!(engine.query_all().await.is_empty());
        assert_eq!(engine.metrics().frames_processed, 0);
    }

    #[tokio::test]
    async fn zone_created_before_frame_counts_against_new_boundary() {
        let engine = CountingEngine::new(immediate(), Vec::new());
        engine.register_source("camera1").await.unwrap();

        // Command then frame: the ordering guarantee means the frame is
        // evaluated against the freshly created zone.
        engine
            .apply_command("camera1", create_zone1())
            .await
            .unwrap();
        engine.submit_detections(inside_frame(1.0, 7)).await.unwrap();

        let views = zone_view(&engine, "camera1").await;
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].in_count, 1);
        assert_eq!(views[0].occupants, vec![7]);
    }

    #[tokio::test]
    async fn count_updates_are_broadcast() {
        let engine = CountingEngine::new(immediate(), Vec::new());
        engine.register_source("camera1").await.unwrap();
        let mut events = engine.subscribe();

        engine
            .apply_command("camera1", create_zone1())
            .await
            .unwrap();
        engine.submit_detections(inside_frame(1.0, 7)).await.unwrap();

        let update = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(update.source_id, "camera1");
        assert_eq!(update.zone_id, "zone1");
        assert_eq!(update.in_count, 1);
        assert_eq!(update.occupant_count, 1);
        let event = update.last_event.unwrap();
        assert_eq!(event.direction, Direction::Enter);
        assert_eq!(event.track_id, 7);
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let engine = CountingEngine::new(immediate(), Vec::new());
        engine.register_source("camera1").await.unwrap();
        engine
            .apply_command("camera1", create_zone1())
            .await
            .unwrap();
        engine.register_source("camera1").await.unwrap();

        // The second registration did not spawn a fresh actor over an
        // empty table.
        assert_eq!(zone_view(&engine, "camera1").await.len(), 1);
    }

    #[tokio::test]
    async fn unregister_retains_zones_and_reregistration_continues_counts() {
        let engine = CountingEngine::new(immediate(), Vec::new());
        engine.register_source("camera1").await.unwrap();
        engine
            .apply_command("camera1", create_zone1())
            .await
            .unwrap();
        engine.submit_detections(inside_frame(1.0, 7)).await.unwrap();
        let views = zone_view(&engine, "camera1").await;
        assert_eq!(views[0].in_count, 1);

        engine.unregister_source("camera1").await.unwrap();
        let phases = engine.source_phases().await;
        assert_eq!(phases["camera1"], SourcePhase::Stopped);

        // Retained state answers queries and commands while stopped.
        let views = zone_view(&engine, "camera1").await;
        assert_eq!(views[0].in_count, 1);

        engine.register_source("camera1").await.unwrap();
        engine.submit_detections(inside_frame(2.0, 8)).await.unwrap();
        let views = zone_view(&engine, "camera1").await;
        assert_eq!(views[0].in_count, 2);
    }

    #[tokio::test]
    async fn detections_for_stopped_source_are_absorbed() {
        let engine = CountingEngine::new(immediate(), Vec::new());
        engine.register_source("camera1").await.unwrap();
        engine
            .apply_command("camera1", create_zone1())
            .await
            .unwrap();
        engine.unregister_source("camera1").await.unwrap();

        engine.submit_detections(inside_frame(1.0, 7)).await.unwrap();
        assert_eq!(engine.metrics().frames_dropped, 1);
        assert_eq!(zone_view(&engine, "camera1").await[0].in_count, 0);
    }

    #[tokio::test]
    async fn default_zones_seed_new_sources_only_once() {
        let seeds = vec![ZoneSeed {
            zone_id: "lobby".to_string(),
            boundary: zone1(),
        }];
        let engine = CountingEngine::new(immediate(), seeds);
        engine.register_source("camera1").await.unwrap();

        let views = zone_view(&engine, "camera1").await;
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].zone_id, "lobby");

        // Deleting the seeded zone and re-registering must not recreate it.
        engine
            .apply_command(
                "camera1",
                ControlCommand::DeleteZone {
                    zone_id: "lobby".to_string(),
                },
            )
            .await
            .unwrap();
        engine.unregister_source("camera1").await.unwrap();
        engine.register_source("camera1").await.unwrap();
        assert!(zone_view(&engine, "camera1").await.is_empty());
    }

    #[tokio::test]
    async fn query_all_spans_sources() {
        let engine = CountingEngine::new(immediate(), Vec::new());
        for source in ["camera1", "camera2"] {
            engine.register_source(source).await.unwrap();
            engine.apply_command(source, create_zone1()).await.unwrap();
        }
        engine.submit_detections(inside_frame(1.0, 7)).await.unwrap();
        // Barrier on camera1 so the frame is applied before the query.
        zone_view(&engine, "camera1").await;

        let views = engine.query_all().await;
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].source_id, "camera1");
        assert_eq!(views[0].in_count, 1);
        assert_eq!(views[1].source_id, "camera2");
        assert_eq!(views[1].in_count, 0);
    }

    #[tokio::test]
    async fn vanished_track_is_force_exited_once() {
        let config = CountingConfig {
            min_dwell_ms: 0,
            exit_grace_ms: 50,
            ..Default::default()
        };
        let engine = CountingEngine::new(config, Vec::new());
        engine.register_source("camera1").await.unwrap();
        engine
            .apply_command("camera1", create_zone1())
            .await
            .unwrap();
        engine.submit_detections(inside_frame(1.0, 7)).await.unwrap();
        assert_eq!(zone_view(&engine, "camera1").await[0].in_count, 1);

        // No further sightings: the sweep commits exactly one forced exit.
        tokio::time::sleep(Duration::from_millis(400)).await;
        let views = zone_view(&engine, "camera1").await;
        assert_eq!(views[0].out_count, 1);
        assert!(views[0].occupants.is_empty());
        assert_eq!(views[0].history.len(), 2);
        assert!(views[0].history[1].forced);
        assert_eq!(engine.metrics().forced_exits, 1);
    }

    #[tokio::test]
    async fn reset_scenario_zeroes_state_both_times() {
        let engine = CountingEngine::new(immediate(), Vec::new());
        engine.register_source("camera1").await.unwrap();
        engine
            .apply_command("camera1", create_zone1())
            .await
            .unwrap();
        for track in [2u64, 9, 11, 12, 13] {
            engine
                .submit_detections(inside_frame(1.0, track))
                .await
                .unwrap();
        }
        for track in [11u64, 12, 13] {
            engine
                .submit_detections(DetectionFrame::new(
                    "camera1",
                    2.0,
                    vec![Detection::new(track, 10.0, 10.0)],
                ))
                .await
                .unwrap();
        }
        let views = zone_view(&engine, "camera1").await;
        assert_eq!(views[0].in_count, 5);
        assert_eq!(views[0].out_count, 3);
        assert_eq!(views[0].occupants, vec![2, 9]);

        for _ in 0..2 {
            let outcome = engine
                .apply_command(
                    "camera1",
                    ControlCommand::ResetZone {
                        zone_id: "zone1".to_string(),
                    },
                )
                .await
                .unwrap();
            match outcome {
                CommandOutcome::Zone(view) => {
                    assert_eq!(view.in_count, 0);
                    assert_eq!(view.out_count, 0);
                    assert!(view.occupants.is_empty());
                    assert!(view.history.is_empty());
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn active_source_hint_requires_known_source() {
        let engine = CountingEngine::new(immediate(), Vec::new());
        engine.register_source("camera1").await.unwrap();
        assert!(matches!(
            engine.set_active_source("camera9").await,
            Err(EngineError::UnknownSource(_))
        ));
        engine.set_active_source("camera1").await.unwrap();
        assert_eq!(engine.active_source().as_deref(), Some("camera1"));
    }

    #[tokio::test]
    async fn shutdown_returns_final_snapshot() {
        let engine = CountingEngine::new(immediate(), Vec::new());
        engine.register_source("camera1").await.unwrap();
        engine
            .apply_command("camera1", create_zone1())
            .await
            .unwrap();
        engine.submit_detections(inside_frame(1.0, 7)).await.unwrap();
        zone_view(&engine, "camera1").await;

        let snapshot = engine.shutdown().await;
        assert_eq!(snapshot.zone_count(), 1);
        assert_eq!(snapshot.sources["camera1"]["zone1"].in_count, 1);
        assert_eq!(
            engine.source_phases().await["camera1"],
            SourcePhase::Stopped
        );
    }

    #[tokio::test]
    async fn restore_then_register_resumes_counting() {
        let engine = CountingEngine::new(immediate(), Vec::new());
        engine.register_source("camera1").await.unwrap();
        engine
            .apply_command("camera1", create_zone1())
            .await
            .unwrap();
        engine.submit_detections(inside_frame(1.0, 7)).await.unwrap();
        zone_view(&engine, "camera1").await;
        let snapshot = engine.shutdown().await;

        // Fresh engine, as after a process restart.
        let engine = CountingEngine::new(immediate(), Vec::new());
        engine.restore(snapshot).await;
        let views = engine.query_all().await;
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].in_count, 1);

        engine.register_source("camera1").await.unwrap();
        engine.submit_detections(inside_frame(2.0, 8)).await.unwrap();
        assert_eq!(zone_view(&engine, "camera1").await[0].in_count, 2);
    }
}
