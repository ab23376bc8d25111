use crate::counting::events::{CrossingEvent, Direction};
use crate::geometry::Boundary;
use crate::prelude::CountingConfig;
use crate::snapshot::ZoneSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Instant;

/// Serializable view of one zone, shared by queries and notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneStateView {
    pub source_id: String,
    pub zone_id: String,
    pub boundary: Boundary,
    pub in_count: u64,
    pub out_count: u64,
    pub occupants: Vec<u64>,
    pub history: Vec<CrossingEvent>,
}

/// Candidate transition waiting out the dwell threshold.
#[derive(Debug, Clone, Copy)]
struct PendingTransition {
    target_inside: bool,
    since: Instant,
}

/// Bookkeeping for a track currently considered inside.
#[derive(Debug, Clone, Copy)]
struct Occupant {
    last_seen: Instant,
}

/// Mutable per-zone state, owned by exactly one source actor at a time.
///
/// Counters only move through `commit`, so `in_count`/`out_count` are
/// non-negative and non-decreasing between resets by construction.
#[derive(Debug)]
pub struct ZoneRecord {
    boundary: Boundary,
    in_count: u64,
    out_count: u64,
    occupants: HashMap<u64, Occupant>,
    pending: HashMap<u64, PendingTransition>,
    history: VecDeque<CrossingEvent>,
}

impl ZoneRecord {
    pub fn new(boundary: Boundary) -> Self {
        Self {
            boundary,
            in_count: 0,
            out_count: 0,
            occupants: HashMap::new(),
            pending: HashMap::new(),
            history: VecDeque::new(),
        }
    }

    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    pub fn in_count(&self) -> u64 {
        self.in_count
    }

    pub fn out_count(&self) -> u64 {
        self.out_count
    }

    pub fn occupant_count(&self) -> usize {
        self.occupants.len()
    }

    pub fn is_occupied_by(&self, track_id: u64) -> bool {
        self.occupants.contains_key(&track_id)
    }

    /// Replaces the boundary without touching counters or occupancy.
    /// Later frames evaluate the new boundary only, so a track inside the
    /// old shape but outside the new one exits on its next evaluation.
    pub fn set_boundary(&mut self, boundary: Boundary) {
        self.boundary = boundary;
        self.pending.clear();
    }

    /// Applies one observation of `track_id` against this zone and
    /// returns the committed crossing, if any.
    pub fn observe(
        &mut self,
        track_id: u64,
        is_inside: bool,
        frame_ts: f64,
        now: Instant,
        config: &CountingConfig,
    ) -> Option<CrossingEvent> {
        let was_inside = if let Some(occupant) = self.occupants.get_mut(&track_id) {
            occupant.last_seen = now;
            true
        } else {
            false
        };

        if is_inside == was_inside {
            self.pending.remove(&track_id);
            return None;
        }

        let dwell = match config.min_dwell() {
            None => return Some(self.commit(track_id, is_inside, frame_ts, false, now, config)),
            Some(dwell) => dwell,
        };

        match self.pending.get(&track_id).copied() {
            Some(p) if p.target_inside == is_inside => {
                if now.duration_since(p.since) >= dwell {
                    Some(self.commit(track_id, is_inside, frame_ts, false, now, config))
                } else {
                    None
                }
            }
            _ => {
                self.pending.insert(
                    track_id,
                    PendingTransition {
                        target_inside: is_inside,
                        since: now,
                    },
                );
                None
            }
        }
    }

    /// Force-exits occupants unseen for longer than the grace period and
    /// prunes stale pending transitions for vanished tracks.
    pub fn sweep(&mut self, now: Instant, ts: f64, config: &CountingConfig) -> Vec<CrossingEvent> {
        let mut events = Vec::new();
        if let Some(grace) = config.exit_grace() {
            let expired: Vec<u64> = self
                .occupants
                .iter()
                .filter(|(_, occupant)| now.duration_since(occupant.last_seen) > grace)
                .map(|(track_id, _)| *track_id)
                .collect();
            for track_id in expired {
                events.push(self.commit(track_id, false, ts, true, now, config));
            }
        }
        if let Some(dwell) = config.min_dwell() {
            let ttl = dwell + config.exit_grace().unwrap_or(dwell);
            self.pending
                .retain(|_, p| now.duration_since(p.since) <= ttl);
        }
        events
    }

    /// Zeroes counters and clears occupancy, pending state, and history.
    /// The zone itself survives; calling this twice yields the same state.
    pub fn reset(&mut self) {
        self.in_count = 0;
        self.out_count = 0;
        self.occupants.clear();
        self.pending.clear();
        self.history.clear();
    }

    fn commit(
        &mut self,
        track_id: u64,
        entering: bool,
        ts: f64,
        forced: bool,
        now: Instant,
        config: &CountingConfig,
    ) -> CrossingEvent {
        if entering {
            self.occupants.insert(track_id, Occupant { last_seen: now });
            self.in_count += 1;
        } else {
            self.occupants.remove(&track_id);
            self.out_count += 1;
        }
        self.pending.remove(&track_id);

        let event = CrossingEvent {
            track_id,
            direction: if entering {
                Direction::Enter
            } else {
                Direction::Exit
            },
            forced,
            timestamp: ts,
        };
        if config.history_cap > 0 {
            while self.history.len() >= config.history_cap {
                self.history.pop_front();
            }
            self.history.push_back(event.clone());
        }
        event
    }

    fn occupants_sorted(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.occupants.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn view(&self, source_id: &str, zone_id: &str) -> ZoneStateView {
        ZoneStateView {
            source_id: source_id.to_string(),
            zone_id: zone_id.to_string(),
            boundary: self.boundary.clone(),
            in_count: self.in_count,
            out_count: self.out_count,
            occupants: self.occupants_sorted(),
            history: self.history.iter().cloned().collect(),
        }
    }

    pub fn to_snapshot(&self) -> ZoneSnapshot {
        ZoneSnapshot {
            boundary: self.boundary.clone(),
            in_count: self.in_count,
            out_count: self.out_count,
            occupants: self.occupants_sorted(),
            history: self.history.iter().cloned().collect(),
        }
    }

    /// Rebuilds a record from persisted state. Restored occupants are
    /// treated as seen at restore time so the grace sweep ages them out
    /// if their pipeline never comes back.
    pub fn from_snapshot(snapshot: ZoneSnapshot, now: Instant) -> Self {
        let occupants = snapshot
            .occupants
            .into_iter()
            .map(|track_id| (track_id, Occupant { last_seen: now }))
            .collect();
        Self {
            boundary: snapshot.boundary,
            in_count: snapshot.in_count,
            out_count: snapshot.out_count,
            occupants,
            pending: HashMap::new(),
            history: snapshot.history.into(),
        }
    }
}
