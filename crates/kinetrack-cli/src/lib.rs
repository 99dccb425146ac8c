//! Kinetrack CLI library.
//!
//! Everything between decoded landmarks and a posed avatar: ingestion queues,
//! per-limb trackers, recordings, and the `kinetrack` commands.

pub mod commands;
pub mod config;
pub mod ingest;
pub mod recording;
pub mod tracker;

pub use config::{ConfigError, CoordinateTransform, TrackerConfig};
pub use ingest::{IngestHub, Landmark, LandmarkRouter, Observation, Stream};
pub use recording::{FrameRecord, MotionRecorder, Recording, RecordingError, Replayer};
pub use tracker::{LimbTracker, TickReport, TickStats};
