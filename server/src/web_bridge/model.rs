use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use zonecore::counting::ZoneStateView;
use zonecore::engine::SourcePhase;
use zonecore::geometry::Boundary;
use zonecore::telemetry::MetricsSnapshot;

/// Envelope returned by the state route: everything the web page needs
/// for its initial render.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateView {
    pub active_source: Option<String>,
    pub zones: Vec<ZoneStateView>,
}

/// Health payload: engine metrics plus per-source lifecycle phases.
#[derive(Debug, Clone, Serialize)]
pub struct HealthView {
    pub metrics: MetricsSnapshot,
    pub sources: BTreeMap<String, SourcePhase>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneRequest {
    pub source_id: String,
    pub zone_id: String,
    pub boundary: Boundary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneRef {
    pub source_id: String,
    pub zone_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub source_id: String,
}
