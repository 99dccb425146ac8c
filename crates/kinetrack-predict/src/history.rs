//! Timestamped samples and finite differences over them.

use kinetrack_rig::math::{wrap_angle, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// A value observed at a caller-supplied time in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedSample<T> {
    pub value: T,
    pub time: f64,
}

impl<T> TimedSample<T> {
    pub fn new(value: T, time: f64) -> Self {
        Self { value, time }
    }
}

/// Elapsed time from `from` to `to`, with `default_dt` substituted for
/// zero, negative, or non-finite steps.
pub fn elapsed<T>(from: &TimedSample<T>, to: &TimedSample<T>, default_dt: f64) -> f64 {
    let dt = to.time - from.time;
    if dt > 0.0 && dt.is_finite() {
        dt
    } else {
        default_dt
    }
}

/// Rates of change between consecutive samples.
///
/// `rates[i]` is the change from sample `i` to `i + 1`, and `steps[i]` the
/// time step it was divided by.
pub struct Differences {
    pub rates: Vec<Vec3>,
    pub steps: Vec<f64>,
}

impl Differences {
    /// Second differences. Each rate is taken as the value at the middle of
    /// its interval, so consecutive rates are half an interval plus half the
    /// next apart.
    pub fn second(&self) -> Vec<Vec3> {
        self.rates
            .windows(2)
            .zip(self.steps.windows(2))
            .map(|(r, s)| (r[1] - r[0]) / ((s[0] + s[1]) / 2.0))
            .collect()
    }
}

/// Finite-difference velocities of a position window.
pub fn velocities(samples: &[TimedSample<Vec3>], default_dt: f64) -> Differences {
    let steps: Vec<f64> = samples
        .windows(2)
        .map(|w| elapsed(&w[0], &w[1], default_dt))
        .collect();
    let rates = samples
        .windows(2)
        .zip(&steps)
        .map(|(w, dt)| (w[1].value - w[0].value) / *dt)
        .collect();
    Differences { rates, steps }
}

/// Angular velocity taking `from` to `to` in `dt` seconds, as `axis * angle /
/// dt` with the angle folded into `(-PI, PI]`.
pub fn angular_velocity(from: &Quat, to: &Quat, dt: f64) -> Vec3 {
    let delta = to * from.inverse();
    match delta.axis_angle() {
        Some((axis, angle)) => axis.into_inner() * (wrap_angle(angle) / dt),
        None => Vec3::zeros(),
    }
}

/// Finite-difference angular velocities of a rotation window.
pub fn angular_velocities(samples: &[TimedSample<Quat>], default_dt: f64) -> Differences {
    let steps: Vec<f64> = samples
        .windows(2)
        .map(|w| elapsed(&w[0], &w[1], default_dt))
        .collect();
    let rates = samples
        .windows(2)
        .zip(&steps)
        .map(|(w, dt)| angular_velocity(&w[0].value, &w[1].value, *dt))
        .collect();
    Differences { rates, steps }
}
