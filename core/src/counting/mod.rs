pub mod events;
pub mod table;
pub mod zone;

pub use events::{CountUpdate, CrossingEvent, Direction};
pub use table::ZoneTable;
pub use zone::{ZoneRecord, ZoneStateView};

use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock epoch seconds, used to stamp events that have no frame
/// timestamp to inherit (forced exits found by the timer sweep).
pub fn epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
