//! Constant-velocity Kalman filter for one 3D point.
//!
//! State layout is `[x, vx, y, vy, z, vz]`; only positions are measured.
//! Process noise follows a white-acceleration model.

use nalgebra::{Matrix3, SMatrix, SVector};
use serde::{Deserialize, Serialize};

use kinetrack_rig::math::Vec3;

type Matrix6 = SMatrix<f64, 6, 6>;
type Matrix3x6 = SMatrix<f64, 3, 6>;
type Matrix6x3 = SMatrix<f64, 6, 3>;
type Vector6 = SVector<f64, 6>;

/// Kalman filter tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KalmanConfig {
    /// Variance of the unmodelled acceleration.
    pub acceleration_noise: f64,
    /// Variance of each measured coordinate.
    pub measurement_noise: f64,
    /// Fixed time step between predictions, in seconds.
    pub dt: f64,
}

impl Default for KalmanConfig {
    fn default() -> Self {
        Self {
            acceleration_noise: 1.0,
            measurement_noise: 0.1,
            dt: 0.02,
        }
    }
}

/// Constant-velocity filter over one point.
#[derive(Debug, Clone, PartialEq)]
pub struct KalmanFilter3 {
    transition: Matrix6,
    measurement: Matrix3x6,
    process_noise: Matrix6,
    measurement_noise: Matrix3<f64>,
    covariance: Matrix6,
    state: Vector6,
}

impl Default for KalmanFilter3 {
    fn default() -> Self {
        Self::new(KalmanConfig::default())
    }
}

impl KalmanFilter3 {
    /// Filter at the origin with unit covariance.
    pub fn new(config: KalmanConfig) -> Self {
        let dt = config.dt;
        let mut transition = Matrix6::identity();
        let mut measurement = Matrix3x6::zeros();
        let mut noise_gain = Matrix6x3::zeros();
        for axis in 0..3 {
            let (p, v) = (2 * axis, 2 * axis + 1);
            transition[(p, v)] = dt;
            measurement[(axis, p)] = 1.0;
            noise_gain[(p, axis)] = dt * dt / 2.0;
            noise_gain[(v, axis)] = dt;
        }
        let process_noise = noise_gain * noise_gain.transpose() * config.acceleration_noise;

        Self {
            transition,
            measurement,
            process_noise,
            measurement_noise: Matrix3::identity() * config.measurement_noise,
            covariance: Matrix6::identity(),
            state: Vector6::zeros(),
        }
    }

    /// Filter whose state starts at `position` with zero velocity.
    pub fn starting_at(config: KalmanConfig, position: Vec3) -> Self {
        let mut filter = Self::new(config);
        for axis in 0..3 {
            filter.state[2 * axis] = position[axis];
        }
        filter
    }

    /// Propagates the state one step.
    pub fn predict(&mut self) {
        self.state = self.transition * self.state;
        self.covariance =
            self.transition * self.covariance * self.transition.transpose() + self.process_noise;
    }

    /// Folds in a position measurement. A singular innovation covariance is
    /// replaced by the identity.
    pub fn update(&mut self, measured: &Vec3) {
        let innovation = measured - self.measurement * self.state;
        let s = self.measurement * self.covariance * self.measurement.transpose()
            + self.measurement_noise;
        let s_inv = s.try_inverse().unwrap_or_else(Matrix3::identity);
        let gain = self.covariance * self.measurement.transpose() * s_inv;

        self.state += gain * innovation;
        self.covariance = (Matrix6::identity() - gain * self.measurement) * self.covariance;
    }

    /// `predict` then `update`, returning the filtered position.
    pub fn filter(&mut self, measured: &Vec3) -> Vec3 {
        self.predict();
        self.update(measured);
        self.position()
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(self.state[0], self.state[2], self.state[4])
    }

    pub fn velocity(&self) -> Vec3 {
        Vec3::new(self.state[1], self.state[3], self.state[5])
    }
}
