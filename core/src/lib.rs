//! Counting core and pipeline interface for the Rust zone visitor platform.
//!
//! The modules mirror the legacy multi-camera visitor counter while
//! providing typed boundaries, per-source serialized actors, and
//! well-defined control commands.

pub mod counting;
pub mod engine;
pub mod geometry;
pub mod ingest;
pub mod prelude;
pub mod snapshot;
pub mod telemetry;

pub use prelude::{CountingConfig, EngineError, EngineResult};
