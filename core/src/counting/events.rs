use serde::{Deserialize, Serialize};

/// Direction of a committed zone crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Enter,
    Exit,
}

/// Immutable record appended to a zone's bounded history on a committed
/// transition. `forced` marks an exit recorded because the track vanished
/// from input past the grace period rather than crossing the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossingEvent {
    pub track_id: u64,
    pub direction: Direction,
    #[serde(default)]
    pub forced: bool,
    pub timestamp: f64,
}

/// Count-change notification published to the web/socket collaborator
/// after every committed transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountUpdate {
    pub source_id: String,
    pub zone_id: String,
    pub in_count: u64,
    pub out_count: u64,
    pub occupant_count: usize,
    pub last_event: Option<CrossingEvent>,
}
