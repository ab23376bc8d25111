use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use zonecore::engine::CountingEngine;
use zonecore::geometry::Point;
use zonecore::ingest::{Detection, DetectionFrame};

/// Configuration for the synthetic walker feed that stands in for the
/// camera pipeline during offline runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub source_id: String,
    pub tracks: usize,
    pub fps: u32,
    pub frame_width: f32,
    pub frame_height: f32,
    pub max_step: f32,
    pub seed: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            source_id: "camera1".to_string(),
            tracks: 6,
            fps: 30,
            frame_width: 1920.0,
            frame_height: 1080.0,
            max_step: 40.0,
            seed: 0,
        }
    }
}

struct Walker {
    track_id: u64,
    position: Point,
    velocity: (f32, f32),
}

/// Seeded random-walk generator: the same seed always produces the same
/// detection sequence.
pub struct WalkerFeed {
    config: FeedConfig,
    rng: StdRng,
    walkers: Vec<Walker>,
    frame_index: u64,
}

impl WalkerFeed {
    pub fn new(config: FeedConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let max_step = config.max_step.max(1.0);
        let walkers = (0..config.tracks.max(1))
            .map(|index| Walker {
                track_id: index as u64 + 1,
                position: Point::new(
                    rng.gen_range(0.0..config.frame_width.max(1.0)),
                    rng.gen_range(0.0..config.frame_height.max(1.0)),
                ),
                velocity: (
                    rng.gen_range(-max_step..max_step),
                    rng.gen_range(-max_step..max_step),
                ),
            })
            .collect();
        Self {
            config,
            rng,
            walkers,
            frame_index: 0,
        }
    }

    /// Advances every walker one frame, bouncing at the frame edges.
    pub fn next_frame(&mut self) -> DetectionFrame {
        let timestamp = self.frame_index as f64 / self.config.fps.max(1) as f64;
        self.frame_index += 1;

        let mut detections = Vec::with_capacity(self.walkers.len());
        for walker in &mut self.walkers {
            walker.position.x += walker.velocity.0 + self.rng.gen_range(-1.0..1.0);
            walker.position.y += walker.velocity.1 + self.rng.gen_range(-1.0..1.0);
            if walker.position.x < 0.0 || walker.position.x > self.config.frame_width {
                walker.velocity.0 = -walker.velocity.0;
                walker.position.x = walker.position.x.clamp(0.0, self.config.frame_width);
            }
            if walker.position.y < 0.0 || walker.position.y > self.config.frame_height {
                walker.velocity.1 = -walker.velocity.1;
                walker.position.y = walker.position.y.clamp(0.0, self.config.frame_height);
            }
            detections.push(Detection {
                track_id: walker.track_id,
                position: walker.position,
            });
        }
        DetectionFrame::new(self.config.source_id.clone(), timestamp, detections)
    }
}

/// Registers the configured source and drives the engine at the feed's
/// frame rate. `frames == 0` runs until the task is cancelled.
pub async fn run(
    engine: Arc<CountingEngine>,
    config: FeedConfig,
    frames: u64,
) -> anyhow::Result<()> {
    engine.register_source(&config.source_id).await?;
    let period = Duration::from_secs_f64(1.0 / config.fps.max(1) as f64);
    let mut feed = WalkerFeed::new(config);
    let mut sent = 0u64;
    loop {
        if frames > 0 && sent >= frames {
            return Ok(());
        }
        engine.submit_detections(feed.next_frame()).await?;
        sent += 1;
        tokio::time::sleep(period).await;
    }
}
