pub mod store;

pub use store::SnapshotStore;

use crate::counting::{CrossingEvent, ZoneStateView};
use crate::geometry::Boundary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Durable fields of one zone, keyed by `(source_id, zone_id)` in the
/// enclosing [`EngineSnapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneSnapshot {
    pub boundary: Boundary,
    pub in_count: u64,
    pub out_count: u64,
    pub occupants: Vec<u64>,
    pub history: Vec<CrossingEvent>,
}

/// Point-in-time copy of every source's zone state, written periodically
/// and on graceful shutdown, read once at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub sources: BTreeMap<String, BTreeMap<String, ZoneSnapshot>>,
}

impl EngineSnapshot {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn zone_count(&self) -> usize {
        self.sources.values().map(|zones| zones.len()).sum()
    }

    pub fn from_views(views: Vec<ZoneStateView>) -> Self {
        let mut sources: BTreeMap<String, BTreeMap<String, ZoneSnapshot>> = BTreeMap::new();
        for view in views {
            sources.entry(view.source_id).or_default().insert(
                view.zone_id,
                ZoneSnapshot {
                    boundary: view.boundary,
                    in_count: view.in_count,
                    out_count: view.out_count,
                    occupants: view.occupants,
                    history: view.history,
                },
            );
        }
        Self { sources }
    }
}
