//! JSON output types for machine-readable CLI output.
//!
//! Every command given `--json` prints exactly one of these documents to
//! stdout.

use std::collections::BTreeMap;

use kinetrack_rig::{Quat, Skeleton, Vec3};
use serde::{Deserialize, Serialize};

use crate::tracker::TickStats;

/// Error codes for CLI operations.
///
/// These codes are stable and can be used for programmatic error handling.
pub mod error_codes {
    /// Recording could not be read or parsed
    pub const RECORDING_READ: &str = "KT_001";
    /// Configuration file could not be read, parsed, or validated
    pub const CONFIG_INVALID: &str = "KT_002";
    /// Recording could not be written
    pub const RECORDING_WRITE: &str = "KT_003";
    /// Tracking pipeline failed to start
    pub const PIPELINE: &str = "KT_004";
}

/// A structured error in JSON output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsonError {
    /// Stable error code (e.g., "KT_001")
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// File involved, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl JsonError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            file: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

/// Envelope shared by every command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandOutput<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<JsonError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
}

impl<T> CommandOutput<T> {
    pub fn success(result: T) -> Self {
        Self {
            success: true,
            errors: Vec::new(),
            result: Some(result),
        }
    }

    pub fn failure(error: JsonError) -> Self {
        Self {
            success: false,
            errors: vec![error],
            result: None,
        }
    }
}

// =============================================================================
// Replay
// =============================================================================

/// World pose of one bone.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BonePose {
    pub position: [f64; 3],
    /// `[x, y, z, w]`
    pub rotation: [f64; 4],
}

impl BonePose {
    pub fn new(position: &Vec3, rotation: &Quat) -> Self {
        let q = rotation.quaternion().coords;
        Self {
            position: [position.x, position.y, position.z],
            rotation: [q.x, q.y, q.z, q.w],
        }
    }
}

/// World poses of every bone, keyed by name.
pub fn skeleton_poses(skeleton: &Skeleton) -> BTreeMap<String, BonePose> {
    let rotations = skeleton.world_rotations();
    skeleton
        .world_positions()
        .into_iter()
        .filter_map(|(name, position)| {
            let rotation = rotations.get(&name)?;
            let pose = BonePose::new(&position, rotation);
            Some((name, pose))
        })
        .collect()
}

/// Final state of one tracker after a replay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackerResult {
    pub name: String,
    pub streams: Vec<String>,
    pub ticks: TickStats,
    /// Joints with a trained position model.
    pub trained_joints: Vec<u32>,
    pub poses: BTreeMap<String, BonePose>,
}

/// Result of `kinetrack replay`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplayResult {
    pub input: String,
    pub frames: usize,
    pub duration: f64,
    /// Landmarks routed onto a stream.
    pub routed: usize,
    /// Landmarks mapping to no bone or stream.
    pub dropped: usize,
    pub trackers: Vec<TrackerResult>,
}

// =============================================================================
// Predict
// =============================================================================

/// Prediction error for one joint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JointError {
    pub stream: String,
    pub joint: u32,
    pub bone: String,
    /// Predictions that could be scored.
    pub scored: usize,
    pub kinematic_rmse: f64,
    pub blended_rmse: f64,
    pub model_trained: bool,
}

/// Result of `kinetrack predict`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictResult {
    pub input: String,
    /// Fixed horizon in seconds, or `None` for one step ahead.
    pub lookahead: Option<f64>,
    pub joints: Vec<JointError>,
    pub kinematic_rmse: f64,
    pub blended_rmse: f64,
}

// =============================================================================
// Synth
// =============================================================================

/// Result of `kinetrack synth`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SynthResult {
    pub output: String,
    pub frames: usize,
    pub landmarks: usize,
    pub seed: u64,
    pub duration: f64,
}
