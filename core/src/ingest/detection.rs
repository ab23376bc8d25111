use crate::geometry::Point;
use serde::{Deserialize, Serialize};

/// One tracked subject observed in a single processed frame.
///
/// `position` is the representative point chosen upstream (centroid or
/// feet point); the engine treats it as opaque pixel coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub track_id: u64,
    pub position: Point,
}

impl Detection {
    pub fn new(track_id: u64, x: f32, y: f32) -> Self {
        Self {
            track_id,
            position: Point::new(x, y),
        }
    }
}

/// Per-frame payload delivered by the upstream detection pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionFrame {
    pub source_id: String,
    pub timestamp: f64,
    pub detections: Vec<Detection>,
}

impl DetectionFrame {
    pub fn new(source_id: impl Into<String>, timestamp: f64, detections: Vec<Detection>) -> Self {
        Self {
            source_id: source_id.into(),
            timestamp,
            detections,
        }
    }

    pub fn track_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.detections.iter().map(|d| d.track_id)
    }
}
