//! Closed-form constant-acceleration extrapolation.
//!
//! Both channels use the last [`KINEMATIC_WINDOW`] samples: three finite
//! difference rates, two second differences averaged into one acceleration,
//! and the rate carried forward to the last sample before extrapolating. With
//! a shorter history the last sample is returned unchanged.

use kinetrack_rig::math::{Quat, Vec3};

use crate::history::{angular_velocities, velocities, Differences, TimedSample};

/// Samples used by the kinematic estimate.
pub const KINEMATIC_WINDOW: usize = 4;

/// Rate at the last sample and the averaged acceleration.
fn rate_and_acceleration(diff: &Differences) -> Option<(Vec3, Vec3)> {
    let accelerations = diff.second();
    if accelerations.is_empty() {
        return None;
    }
    let acceleration =
        accelerations.iter().fold(Vec3::zeros(), |sum, a| sum + a) / accelerations.len() as f64;
    let (rate, step) = (diff.rates.last()?, diff.steps.last()?);
    Some((rate + acceleration * (step / 2.0), acceleration))
}

/// `p(t + delta) = p + v·delta + ½·a·delta²`.
///
/// Returns `None` only for an empty history.
pub fn extrapolate_position(
    samples: &[TimedSample<Vec3>],
    delta: f64,
    default_dt: f64,
) -> Option<Vec3> {
    let last = samples.last()?;
    if samples.len() < KINEMATIC_WINDOW {
        return Some(last.value);
    }
    let window = &samples[samples.len() - KINEMATIC_WINDOW..];
    match rate_and_acceleration(&velocities(window, default_dt)) {
        Some((velocity, acceleration)) => {
            Some(last.value + velocity * delta + acceleration * (0.5 * delta * delta))
        }
        None => Some(last.value),
    }
}

/// `q(t + delta) = exp(ω·delta + ½·α·delta²) · q`.
///
/// Returns `None` only for an empty history.
pub fn extrapolate_rotation(
    samples: &[TimedSample<Quat>],
    delta: f64,
    default_dt: f64,
) -> Option<Quat> {
    let last = samples.last()?;
    if samples.len() < KINEMATIC_WINDOW {
        return Some(last.value);
    }
    let window = &samples[samples.len() - KINEMATIC_WINDOW..];
    match rate_and_acceleration(&angular_velocities(window, default_dt)) {
        Some((omega, alpha)) => {
            let rotation = omega * delta + alpha * (0.5 * delta * delta);
            Some(Quat::from_scaled_axis(rotation) * last.value)
        }
        None => Some(last.value),
    }
}
