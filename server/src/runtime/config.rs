use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use zonecore::engine::ZoneSeed;
use zonecore::geometry::{Boundary, Point};
use zonecore::prelude::CountingConfig;

/// Operator-facing settings, loadable from YAML.
///
/// The counting knobs map one-to-one onto [`CountingConfig`];
/// `default_zones` are seeded into every source on first sight, matching
/// the behavior of the original deployment.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub min_dwell_ms: u64,
    pub exit_grace_ms: u64,
    pub history_cap: usize,
    pub frame_queue_cap: usize,
    pub command_queue_cap: usize,
    pub command_timeout_ms: u64,
    pub snapshot_path: PathBuf,
    pub snapshot_interval_secs: u64,
    pub bind_host: String,
    pub bind_port: u16,
    pub default_zones: Vec<ZoneSeed>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            min_dwell_ms: 300,
            exit_grace_ms: 1_000,
            history_cap: 256,
            frame_queue_cap: 8,
            command_queue_cap: 32,
            command_timeout_ms: 1_000,
            snapshot_path: PathBuf::from("zone_counts.json"),
            snapshot_interval_secs: 30,
            bind_host: "127.0.0.1".to_string(),
            bind_port: 9000,
            default_zones: vec![ZoneSeed {
                zone_id: "zone1".to_string(),
                boundary: Boundary::rectangle(
                    Point::new(640.0, 360.0),
                    Point::new(1280.0, 700.0),
                ),
            }],
        }
    }
}

impl EngineSettings {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading engine settings {}", path_ref.display()))?;
        let settings: EngineSettings = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing engine settings {}", path_ref.display()))?;
        for seed in &settings.default_zones {
            seed.boundary
                .validate()
                .with_context(|| format!("default zone {}", seed.zone_id))?;
        }
        Ok(settings)
    }

    pub fn to_counting_config(&self) -> CountingConfig {
        CountingConfig {
            min_dwell_ms: self.min_dwell_ms,
            exit_grace_ms: self.exit_grace_ms,
            history_cap: self.history_cap,
            frame_queue_cap: self.frame_queue_cap,
            command_queue_cap: self.command_queue_cap,
            command_timeout_ms: self.command_timeout_ms,
        }
    }

    pub fn bind_address(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.bind_host, self.bind_port)
            .parse()
            .with_context(|| {
                format!("invalid bind address {}:{}", self.bind_host, self.bind_port)
            })
    }
}
