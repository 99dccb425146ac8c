//! Planar two-link arm dynamics.
//!
//! A rigid shoulder/elbow model driven by joint torques. It produces plausible
//! synthetic arm motion for demos and test recordings; it is not used by the
//! reconstruction pipeline itself.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

use crate::math::{axis_angle_deg, Vec3};
use crate::skeleton::Skeleton;

/// Physical parameters of the arm (SI units).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArmParameters {
    /// Upper arm mass.
    pub m1: f64,
    /// Forearm mass.
    pub m2: f64,
    /// Upper arm length.
    pub l1: f64,
    /// Forearm length.
    pub l2: f64,
    /// Upper arm moment of inertia.
    pub i1: f64,
    /// Forearm moment of inertia.
    pub i2: f64,
    pub gravity: f64,
}

impl Default for ArmParameters {
    fn default() -> Self {
        Self {
            m1: 2.0,
            m2: 1.0,
            l1: 0.5,
            l2: 0.4,
            i1: 0.02,
            i2: 0.01,
            gravity: 9.81,
        }
    }
}

/// Shoulder angle range in radians.
pub const SHOULDER_RANGE: (f64, f64) = (0.0, FRAC_PI_2);
/// Elbow angle range in radians.
pub const ELBOW_RANGE: (f64, f64) = (0.0, PI);

/// Two-link arm state: joint angles `(shoulder, elbow)` and their rates.
#[derive(Debug, Clone, PartialEq)]
pub struct TwoLinkArm {
    params: ArmParameters,
    theta: Vector2<f64>,
    theta_dot: Vector2<f64>,
    /// Torques applied on the next step.
    pub muscle_torque: Vector2<f64>,
}

impl Default for TwoLinkArm {
    fn default() -> Self {
        Self::new(ArmParameters::default())
    }
}

impl TwoLinkArm {
    /// Arm at rest with both joints at 45 degrees.
    pub fn new(params: ArmParameters) -> Self {
        Self {
            params,
            theta: Vector2::new(FRAC_PI_4, FRAC_PI_4),
            theta_dot: Vector2::zeros(),
            muscle_torque: Vector2::zeros(),
        }
    }

    pub fn params(&self) -> &ArmParameters {
        &self.params
    }

    /// Joint angles `(shoulder, elbow)` in radians.
    pub fn joint_angles(&self) -> Vector2<f64> {
        self.theta
    }

    pub fn joint_velocities(&self) -> Vector2<f64> {
        self.theta_dot
    }

    /// Overrides the joint angles, clamped to the joint ranges.
    pub fn set_joint_angles(&mut self, theta: Vector2<f64>) {
        self.theta = Self::clamp_angles(theta);
    }

    fn clamp_angles(theta: Vector2<f64>) -> Vector2<f64> {
        Vector2::new(
            theta.x.clamp(SHOULDER_RANGE.0, SHOULDER_RANGE.1),
            theta.y.clamp(ELBOW_RANGE.0, ELBOW_RANGE.1),
        )
    }

    /// Advances the arm by `dt` seconds with semi-implicit Euler.
    ///
    /// A joint that runs into its stop loses its velocity.
    pub fn step(&mut self, dt: f64) {
        let acceleration = self.acceleration();
        self.theta_dot += acceleration * dt;
        let unclamped = self.theta + self.theta_dot * dt;
        self.theta = Self::clamp_angles(unclamped);
        for i in 0..2 {
            if self.theta[i] != unclamped[i] {
                self.theta_dot[i] = 0.0;
            }
        }
    }

    /// Joint accelerations from `M(θ)·θ̈ = τ - C(θ, θ̇) - G(θ)`.
    ///
    /// A singular mass matrix yields zero acceleration.
    pub fn acceleration(&self) -> Vector2<f64> {
        let p = &self.params;
        let (th, th_dot) = (self.theta, self.theta_dot);
        let (s2, c2) = th.y.sin_cos();
        let (half_l1, half_l2) = (p.l1 / 2.0, p.l2 / 2.0);

        let m11 = p.i1
            + p.i2
            + p.m1 * half_l1 * half_l1
            + p.m2 * (p.l1 * p.l1 + half_l2 * half_l2 + 2.0 * p.l1 * half_l2 * c2);
        let m12 = p.i2 + p.m2 * (half_l2 * half_l2 + p.l1 * half_l2 * c2);
        let m22 = p.i2 + p.m2 * half_l2 * half_l2;
        let mass = Matrix2::new(m11, m12, m12, m22);

        let h = -p.m2 * p.l1 * half_l2 * s2;
        let coriolis = Vector2::new(
            h * th_dot.y * (2.0 * th_dot.x + th_dot.y),
            h * th_dot.x * th_dot.x,
        );

        let g2 = p.m2 * half_l2 * p.gravity * (th.x + th.y).cos();
        let g1 = (p.m1 * half_l1 + p.m2 * p.l1) * p.gravity * th.x.cos() + g2;
        let gravity = Vector2::new(g1, g2);

        let rhs = self.muscle_torque - coriolis - gravity;
        mass.try_inverse()
            .map(|inverse| inverse * rhs)
            .unwrap_or_else(Vector2::zeros)
    }

    /// Planar elbow and wrist positions relative to the shoulder.
    pub fn forward_kinematics(&self) -> (Vec3, Vec3) {
        let p = &self.params;
        let (a1, a12) = (self.theta.x, self.theta.x + self.theta.y);
        let elbow = Vec3::new(p.l1 * a1.cos(), p.l1 * a1.sin(), 0.0);
        let wrist = elbow + Vec3::new(p.l2 * a12.cos(), p.l2 * a12.sin(), 0.0);
        (elbow, wrist)
    }

    /// Writes the joint angles onto two bones as Z-axis rotations. Returns
    /// false if either bone is missing.
    pub fn pose_skeleton(&self, skeleton: &mut Skeleton, upper: &str, lower: &str) -> bool {
        let shoulder = axis_angle_deg(&Vec3::z(), self.theta.x.to_degrees());
        let elbow = axis_angle_deg(&Vec3::z(), self.theta.y.to_degrees());
        let upper_ok = skeleton.set_local_rotation(upper, shoulder);
        let lower_ok = skeleton.set_local_rotation(lower, elbow);
        upper_ok && lower_ok
    }
}

/// Proportional joint controller: `τ = Kp · (desired − current)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PdController {
    pub kp: f64,
}

impl Default for PdController {
    fn default() -> Self {
        Self { kp: 100.0 }
    }
}

impl PdController {
    pub fn new(kp: f64) -> Self {
        Self { kp }
    }

    /// Torques driving `current` toward `desired`.
    pub fn torque(&self, desired: &Vector2<f64>, current: &Vector2<f64>) -> Vector2<f64> {
        (desired - current) * self.kp
    }

    /// Computes torques for `arm` and installs them.
    pub fn drive(&self, arm: &mut TwoLinkArm, desired: &Vector2<f64>) {
        arm.muscle_torque = self.torque(desired, &arm.joint_angles());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gravity_pulls_shoulder_down() {
        let mut arm = TwoLinkArm::default();
        let start = arm.joint_angles();
        arm.step(0.01);
        assert!(arm.joint_angles().x < start.x);
    }

    #[test]
    fn test_angles_stay_in_range() {
        let mut arm = TwoLinkArm::default();
        arm.muscle_torque = Vector2::new(50.0, -50.0);
        for _ in 0..2000 {
            arm.step(0.005);
            let theta = arm.joint_angles();
            assert!((SHOULDER_RANGE.0..=SHOULDER_RANGE.1).contains(&theta.x));
            assert!((ELBOW_RANGE.0..=ELBOW_RANGE.1).contains(&theta.y));
        }
    }

    #[test]
    fn test_controller_torque() {
        let controller = PdController::default();
        let torque = controller.torque(&Vector2::new(1.0, 0.5), &Vector2::new(0.5, 0.5));
        assert_eq!(torque, Vector2::new(50.0, 0.0));
    }

    #[test]
    fn test_controller_lifts_toward_target() {
        let mut arm = TwoLinkArm::default();
        let controller = PdController::default();
        controller.drive(&mut arm, &Vector2::new(1.2, FRAC_PI_4));
        arm.step(0.01);
        assert!(arm.joint_velocities().x > 0.0);
    }

    #[test]
    fn test_mass_matrix_is_positive_definite() {
        let mut arm = TwoLinkArm::default();
        arm.muscle_torque = Vector2::new(1.0, 0.0);
        for elbow in [0.0, 0.5, 1.5, 3.0] {
            arm.set_joint_angles(Vector2::new(0.3, elbow));
            assert!(arm.acceleration().iter().all(|a| a.is_finite()));
        }
    }

    #[test]
    fn test_pose_skeleton_writes_z_rotations() {
        let mut skeleton = Skeleton::new();
        skeleton.add_bone("upperArm", None, Vec3::zeros());
        skeleton.add_bone("forearm", Some("upperArm"), Vec3::new(0.5, 0.0, 0.0));
        let arm = TwoLinkArm::default();
        assert!(arm.pose_skeleton(&mut skeleton, "upperArm", "forearm"));

        let rotation = skeleton.bone("upperArm").unwrap().local_rotation();
        assert!((rotation.angle() - FRAC_PI_4).abs() < 1e-9);
        assert!(!arm.pose_skeleton(&mut skeleton, "upperArm", "missing"));
    }

    #[test]
    fn test_forward_kinematics() {
        let mut arm = TwoLinkArm::default();
        arm.set_joint_angles(Vector2::new(0.0, 0.0));
        let (elbow, wrist) = arm.forward_kinematics();
        assert!((elbow - Vec3::new(0.5, 0.0, 0.0)).norm() < 1e-12);
        assert!((wrist - Vec3::new(0.9, 0.0, 0.0)).norm() < 1e-12);
    }
}
