use crate::counting::events::CountUpdate;
use crate::counting::zone::{ZoneRecord, ZoneStateView};
use crate::geometry::Boundary;
use crate::ingest::DetectionFrame;
use crate::prelude::{CountingConfig, EngineError, EngineResult};
use crate::snapshot::ZoneSnapshot;
use crate::telemetry::LogManager;
use std::collections::BTreeMap;
use std::time::Instant;

/// All zone state for one source, applied one frame at a time.
///
/// Owned by the source's actor while it runs and parked in the registry
/// while the source is inactive; never shared between the two.
pub struct ZoneTable {
    source_id: String,
    config: CountingConfig,
    zones: BTreeMap<String, ZoneRecord>,
    logger: LogManager,
}

impl ZoneTable {
    pub fn new(source_id: impl Into<String>, config: CountingConfig) -> Self {
        let source_id = source_id.into();
        let logger = LogManager::scoped(format!("source {}", source_id));
        Self {
            source_id,
            config,
            zones: BTreeMap::new(),
            logger,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn config(&self) -> &CountingConfig {
        &self.config
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Evaluates every detection in the frame against every zone and
    /// commits the resulting transitions in deterministic zone order.
    pub fn apply_frame(&mut self, frame: &DetectionFrame, now: Instant) -> Vec<CountUpdate> {
        let mut updates = Vec::new();
        for (zone_id, record) in self.zones.iter_mut() {
            for detection in &frame.detections {
                let is_inside = record.boundary().contains(detection.position);
                if let Some(event) =
                    record.observe(detection.track_id, is_inside, frame.timestamp, now, &self.config)
                {
                    updates.push(count_update(&self.source_id, zone_id, record, Some(event)));
                }
            }
            for event in record.sweep(now, frame.timestamp, &self.config) {
                self.logger.record(&format!(
                    "forced exit: track {} left zone {} without crossing",
                    event.track_id, zone_id
                ));
                updates.push(count_update(&self.source_id, zone_id, record, Some(event)));
            }
        }
        updates
    }

    /// Timer-driven pass so occupants of a silent source still age out.
    pub fn sweep(&mut self, now: Instant, ts: f64) -> Vec<CountUpdate> {
        let mut updates = Vec::new();
        for (zone_id, record) in self.zones.iter_mut() {
            for event in record.sweep(now, ts, &self.config) {
                self.logger.record(&format!(
                    "forced exit: track {} left zone {} without crossing",
                    event.track_id, zone_id
                ));
                updates.push(count_update(&self.source_id, zone_id, record, Some(event)));
            }
        }
        updates
    }

    /// Creates a zone or replaces an existing zone's boundary. Updates
    /// keep counters and occupancy; only the pending dwell state is
    /// discarded with the old geometry.
    pub fn create_or_update(
        &mut self,
        zone_id: &str,
        boundary: Boundary,
    ) -> EngineResult<ZoneStateView> {
        boundary.validate()?;
        match self.zones.get_mut(zone_id) {
            Some(record) => {
                record.set_boundary(boundary);
                self.logger.record(&format!("zone {} boundary updated", zone_id));
            }
            None => {
                self.zones
                    .insert(zone_id.to_string(), ZoneRecord::new(boundary));
                self.logger.record(&format!("zone {} created", zone_id));
            }
        }
        self.view(zone_id)
    }

    pub fn reset(&mut self, zone_id: &str) -> EngineResult<ZoneStateView> {
        match self.zones.get_mut(zone_id) {
            Some(record) => record.reset(),
            None => return Err(self.unknown_zone(zone_id)),
        }
        self.logger.record(&format!("zone {} counts reset", zone_id));
        self.view(zone_id)
    }

    pub fn delete(&mut self, zone_id: &str) -> EngineResult<()> {
        if self.zones.remove(zone_id).is_none() {
            return Err(self.unknown_zone(zone_id));
        }
        self.logger.record(&format!("zone {} deleted", zone_id));
        Ok(())
    }

    pub fn view(&self, zone_id: &str) -> EngineResult<ZoneStateView> {
        self.zones
            .get(zone_id)
            .map(|record| record.view(&self.source_id, zone_id))
            .ok_or_else(|| self.unknown_zone(zone_id))
    }

    pub fn views(&self) -> Vec<ZoneStateView> {
        self.zones
            .iter()
            .map(|(zone_id, record)| record.view(&self.source_id, zone_id))
            .collect()
    }

    pub fn to_snapshot(&self) -> BTreeMap<String, ZoneSnapshot> {
        self.zones
            .iter()
            .map(|(zone_id, record)| (zone_id.clone(), record.to_snapshot()))
            .collect()
    }

    /// Rebuilds a table from persisted zones, skipping any whose boundary
    /// no longer validates.
    pub fn from_snapshot(
        source_id: impl Into<String>,
        config: CountingConfig,
        zones: BTreeMap<String, ZoneSnapshot>,
        now: Instant,
    ) -> Self {
        let mut table = Self::new(source_id, config);
        for (zone_id, snapshot) in zones {
            if let Err(err) = snapshot.boundary.validate() {
                table
                    .logger
                    .alert(&format!("skipping restored zone {}: {}", zone_id, err));
                continue;
            }
            table
                .zones
                .insert(zone_id, ZoneRecord::from_snapshot(snapshot, now));
        }
        table
    }

    fn unknown_zone(&self, zone_id: &str) -> EngineError {
        EngineError::UnknownZone {
            source_id: self.source_id.clone(),
            zone_id: zone_id.to_string(),
        }
    }
}

fn count_update(
    source_id: &str,
    zone_id: &str,
    record: &ZoneRecord,
    last_event: Option<crate::counting::events::CrossingEvent>,
) -> CountUpdate {
    CountUpdate {
        source_id: source_id.to_string(),
        zone_id: zone_id.to_string(),
        in_count: record.in_count(),
        out_count: record.out_count(),
        occupant_count: record.occupant_count(),
        last_event,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counting::Direction;
    use crate::geometry::Point;
    use crate::ingest::Detection;
    use std::time::Duration;

    fn immediate() -> CountingConfig {
        CountingConfig {
            min_dwell_ms: 0,
            exit_grace_ms: 100,
            ..Default::default()
        }
    }

    fn table_with_zone(config: CountingConfig) -> ZoneTable {
        let mut table = ZoneTable::new("camera1", config);
        table
            .create_or_update(
                "zone1",
                Boundary::rectangle(Point::new(640.0, 360.0), Point::new(1280.0, 700.0)),
            )
            .unwrap();
        table
    }

    fn frame(ts: f64, detections: Vec<Detection>) -> DetectionFrame {
        DetectionFrame::new("camera1", ts, detections)
    }

    #[test]
    fn outside_then_inside_then_vanished() {
        let mut table = table_with_zone(immediate());
        let t0 = Instant::now();

        // Frame 1: track 7 outside — no change.
        let updates = table.apply_frame(&frame(1.0, vec![Detection::new(7, 300.0, 300.0)]), t0);
        assert!(updates.is_empty());

        // Frame 2: track 7 inside — entry.
        let updates = table.apply_frame(&frame(2.0, vec![Detection::new(7, 900.0, 500.0)]), t0);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].in_count, 1);
        assert_eq!(updates[0].occupant_count, 1);

        // Track 7 absent past the grace period — forced exit.
        let updates = table.sweep(t0 + Duration::from_millis(250), 3.0);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].out_count, 1);
        assert_eq!(updates[0].occupant_count, 0);
        let event = updates[0].last_event.as_ref().unwrap();
        assert!(event.forced);
        assert_eq!(event.direction, Direction::Exit);

        let view = table.view("zone1").unwrap();
        assert_eq!(view.history.len(), 2);
        assert_eq!(view.history[0].direction, Direction::Enter);
        assert_eq!(view.history[1].direction, Direction::Exit);
        assert!(view.occupants.is_empty());
    }

    #[test]
    fn track_that_never_enters_leaves_no_trace() {
        let mut table = table_with_zone(immediate());
        let t0 = Instant::now();
        for step in 0..5u64 {
            let updates = table.apply_frame(
                &frame(step as f64, vec![Detection::new(3, 10.0 + step as f32, 20.0)]),
                t0 + Duration::from_millis(step * 33),
            );
            assert!(updates.is_empty());
        }
        let view = table.view("zone1").unwrap();
        assert_eq!(view.in_count, 0);
        assert!(view.occupants.is_empty());
        assert!(view.history.is_empty());
    }

    #[test]
    fn enter_then_exit_produces_one_event_pair() {
        let mut table = table_with_zone(immediate());
        let t0 = Instant::now();
        table.apply_frame(&frame(1.0, vec![Detection::new(5, 900.0, 500.0)]), t0);
        table.apply_frame(
            &frame(2.0, vec![Detection::new(5, 100.0, 100.0)]),
            t0 + Duration::from_millis(33),
        );

        let view = table.view("zone1").unwrap();
        assert_eq!(view.in_count, 1);
        assert_eq!(view.out_count, 1);
        assert!(view.occupants.is_empty());
        assert_eq!(view.history.len(), 2);
        assert_eq!(view.history[0].direction, Direction::Enter);
        assert_eq!(view.history[1].direction, Direction::Exit);
        assert!(!view.history[1].forced);
    }

    #[test]
    fn counts_never_decrease_between_resets() {
        let mut table = table_with_zone(immediate());
        let t0 = Instant::now();
        let mut last_in = 0;
        let mut last_out = 0;
        for step in 0..20u64 {
            let inside = step % 3 != 2;
            let position = if inside {
                Detection::new(1, 900.0, 500.0)
            } else {
                Detection::new(1, 10.0, 10.0)
            };
            table.apply_frame(
                &frame(step as f64, vec![position]),
                t0 + Duration::from_millis(step),
            );
            let view = table.view("zone1").unwrap();
            assert!(view.in_count >= last_in);
            assert!(view.out_count >= last_out);
            last_in = view.in_count;
            last_out = view.out_count;
        }
    }

    #[test]
    fn reset_clears_populated_zone_idempotently() {
        let mut table = table_with_zone(immediate());
        let t0 = Instant::now();
        for track in [2u64, 9, 11, 12, 13] {
            table.apply_frame(
                &frame(1.0, vec![Detection::new(track, 900.0, 500.0)]),
                t0,
            );
        }
        for track in [11u64, 12, 13] {
            table.apply_frame(
                &frame(2.0, vec![Detection::new(track, 10.0, 10.0)]),
                t0,
            );
        }
        let view = table.view("zone1").unwrap();
        assert_eq!(view.in_count, 5);
        assert_eq!(view.out_count, 3);

        let first = table.reset("zone1").unwrap();
        let second = table.reset("zone1").unwrap();
        for view in [first, second] {
            assert_eq!(view.in_count, 0);
            assert_eq!(view.out_count, 0);
            assert!(view.occupants.is_empty());
            assert!(view.history.is_empty());
        }
    }

    #[test]
    fn boundary_update_keeps_counts_and_exits_on_next_frame() {
        let mut table = table_with_zone(immediate());
        let t0 = Instant::now();
        table.apply_frame(&frame(1.0, vec![Detection::new(7, 900.0, 500.0)]), t0);
        assert_eq!(table.view("zone1").unwrap().in_count, 1);

        // Shrink the zone so (900, 500) is no longer inside.
        table
            .create_or_update(
                "zone1",
                Boundary::rectangle(Point::new(640.0, 360.0), Point::new(800.0, 450.0)),
            )
            .unwrap();
        let view = table.view("zone1").unwrap();
        assert_eq!(view.in_count, 1);
        assert_eq!(view.occupants, vec![7]);

        // Next evaluated frame exits the track against the new boundary.
        let updates = table.apply_frame(
            &frame(2.0, vec![Detection::new(7, 900.0, 500.0)]),
            t0 + Duration::from_millis(33),
        );
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].out_count, 1);
        assert!(table.view("zone1").unwrap().occupants.is_empty());
    }

    #[test]
    fn unknown_zone_operations_fail() {
        let mut table = table_with_zone(immediate());
        assert!(matches!(
            table.reset("nope"),
            Err(EngineError::UnknownZone { .. })
        ));
        assert!(matches!(
            table.delete("nope"),
            Err(EngineError::UnknownZone { .. })
        ));
        assert!(matches!(
            table.view("nope"),
            Err(EngineError::UnknownZone { .. })
        ));
    }

    #[test]
    fn invalid_boundary_is_rejected_and_never_stored() {
        let mut table = ZoneTable::new("camera1", immediate());
        let result = table.create_or_update(
            "bad",
            Boundary::rectangle(Point::new(50.0, 50.0), Point::new(10.0, 10.0)),
        );
        assert!(matches!(result, Err(EngineError::InvalidBoundary(_))));
        assert!(table.is_empty());
    }

    #[test]
    fn snapshot_round_trip_restores_counts() {
        let mut table = table_with_zone(immediate());
        let t0 = Instant::now();
        table.apply_frame(&frame(1.0, vec![Detection::new(4, 900.0, 500.0)]), t0);

        let restored = ZoneTable::from_snapshot(
            "camera1",
            immediate(),
            table.to_snapshot(),
            Instant::now(),
        );
        let view = restored.view("zone1").unwrap();
        assert_eq!(view.in_count, 1);
        assert_eq!(view.occupants, vec![4]);
    }
}
