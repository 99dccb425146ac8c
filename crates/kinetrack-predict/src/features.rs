//! Feature vectors and training examples for the learned correction.
//!
//! Position features (30): position, velocity, and acceleration at three
//! consecutive samples, plus the fourth position, taken from a
//! [`POSITION_WINDOW`]-sample window.
//!
//! Rotation features (14): the first quaternion, its angular velocity and
//! acceleration, plus the second quaternion, taken from a
//! [`ROTATION_WINDOW`]-sample window.
//!
//! Training examples take the window from the oldest end of a full history and
//! label it with the newest sample. Predictions take the window from the
//! newest end.

use kinetrack_rig::math::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::history::{angular_velocities, velocities, TimedSample};

pub const POSITION_WINDOW: usize = 5;
pub const POSITION_FEATURES: usize = 30;
pub const POSITION_OUTPUTS: usize = 3;

pub const ROTATION_WINDOW: usize = 4;
pub const ROTATION_FEATURES: usize = 14;
pub const ROTATION_OUTPUTS: usize = 4;

/// One feature/label pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub features: Vec<f64>,
    pub label: Vec<f64>,
}

/// Position features from the first [`POSITION_WINDOW`] samples.
pub fn position_features(window: &[TimedSample<Vec3>], default_dt: f64) -> Option<Vec<f64>> {
    let window = window.get(..POSITION_WINDOW)?;
    let diff = velocities(window, default_dt);
    let accelerations = diff.second();

    let mut features = Vec::with_capacity(POSITION_FEATURES);
    for i in 0..3 {
        features.extend(window[i].value.iter());
        features.extend(diff.rates[i].iter());
        features.extend(accelerations[i].iter());
    }
    features.extend(window[3].value.iter());
    Some(features)
}

/// Rotation features from the first [`ROTATION_WINDOW`] samples.
pub fn rotation_features(window: &[TimedSample<Quat>], default_dt: f64) -> Option<Vec<f64>> {
    let window = window.get(..ROTATION_WINDOW)?;
    let diff = angular_velocities(window, default_dt);
    let accelerations = diff.second();

    let mut features = Vec::with_capacity(ROTATION_FEATURES);
    features.extend(quat_components(&window[0].value));
    features.extend(diff.rates[0].iter());
    features.extend(accelerations[0].iter());
    features.extend(quat_components(&window[1].value));
    Some(features)
}

/// `[x, y, z, w]`.
pub fn quat_components(q: &Quat) -> [f64; 4] {
    let c = q.quaternion().coords;
    [c.x, c.y, c.z, c.w]
}

/// Position example from a full history: oldest window, newest label.
pub fn position_example(history: &[TimedSample<Vec3>], default_dt: f64) -> Option<TrainingExample> {
    if history.len() <= POSITION_WINDOW {
        return None;
    }
    let label = history.last()?.value;
    Some(TrainingExample {
        features: position_features(history, default_dt)?,
        label: label.iter().copied().collect(),
    })
}

/// Rotation example from a full history: oldest window, newest label.
pub fn rotation_example(history: &[TimedSample<Quat>], default_dt: f64) -> Option<TrainingExample> {
    if history.len() <= ROTATION_WINDOW {
        return None;
    }
    let label = history.last()?.value;
    Some(TrainingExample {
        features: rotation_features(history, default_dt)?,
        label: quat_components(&label).to_vec(),
    })
}

/// Position features from the newest window.
pub fn latest_position_features(
    history: &[TimedSample<Vec3>],
    default_dt: f64,
) -> Option<Vec<f64>> {
    let start = history.len().checked_sub(POSITION_WINDOW)?;
    position_features(&history[start..], default_dt)
}

/// Rotation features from the newest window.
pub fn latest_rotation_features(
    history: &[TimedSample<Quat>],
    default_dt: f64,
) -> Option<Vec<f64>> {
    let start = history.len().checked_sub(ROTATION_WINDOW)?;
    rotation_features(&history[start..], default_dt)
}
