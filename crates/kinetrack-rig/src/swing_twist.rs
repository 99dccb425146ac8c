//! Swing-twist decomposition of rotations around a bone axis.
//!
//! Any rotation `q` can be written as `swing * twist`, where `twist` is a
//! rotation around the bone axis (roll) and `swing` moves the axis to its new
//! direction without roll. Limits are then applied to the two parts
//! separately.

use nalgebra::{Quaternion, Unit};

use crate::math::{wrap_angle, Quat, Vec3, DIRECTION_EPSILON};

/// Quaternions whose twist component is shorter than this are treated as a
/// pure swing (the bone axis is flipped by half a turn).
const TWIST_EPSILON: f64 = 1e-9;

/// Swing and twist parts of a rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwingTwist {
    /// Rotation moving the twist axis to its new direction.
    pub swing: Quat,
    /// Rotation around the twist axis.
    pub twist: Quat,
}

impl SwingTwist {
    /// Splits `rotation` around `axis`.
    ///
    /// The twist is the rotation's vector part projected onto the axis, with
    /// the scalar part kept; the swing is whatever remains. A zero axis puts
    /// everything into the swing.
    pub fn decompose(rotation: &Quat, axis: &Vec3) -> Self {
        let Some(axis) = Unit::try_new(*axis, DIRECTION_EPSILON) else {
            return Self {
                swing: *rotation,
                twist: Quat::identity(),
            };
        };

        let projected = axis.into_inner() * rotation.imag().dot(&axis);
        let raw = Quaternion::from_parts(rotation.scalar(), projected);
        let twist = if raw.norm() > TWIST_EPSILON {
            Quat::new_normalize(raw)
        } else {
            Quat::identity()
        };

        Self {
            swing: rotation * twist.inverse(),
            twist,
        }
    }

    /// `swing * twist`.
    pub fn recompose(&self) -> Quat {
        self.swing * self.twist
    }

    /// Signed twist angle around `axis` in radians, in `(-PI, PI]`.
    pub fn twist_angle(&self, axis: &Vec3) -> f64 {
        let Some(axis) = Unit::try_new(*axis, DIRECTION_EPSILON) else {
            return 0.0;
        };
        let s = self.twist.imag().dot(&axis);
        wrap_angle(2.0 * s.atan2(self.twist.scalar()))
    }

    /// Unsigned swing angle in radians, in `[0, PI]`.
    pub fn swing_angle(&self) -> f64 {
        self.swing.angle()
    }
}

/// Clamps the twist of `rotation` around `axis` to `[min_twist, max_twist]` and
/// its swing to `[0, max_swing]` (all radians), then recomposes.
pub fn clamp_swing_twist(
    rotation: &Quat,
    axis: &Vec3,
    min_twist: f64,
    max_twist: f64,
    max_swing: f64,
) -> Quat {
    let Some(unit_axis) = Unit::try_new(*axis, DIRECTION_EPSILON) else {
        return *rotation;
    };
    let parts = SwingTwist::decompose(rotation, axis);

    let twist_angle = parts.twist_angle(axis).clamp(min_twist, max_twist);
    let twist = Quat::from_axis_angle(&unit_axis, twist_angle);

    let swing = match parts.swing.axis_angle() {
        Some((swing_axis, angle)) if angle > max_swing => {
            Quat::from_axis_angle(&swing_axis, max_swing.max(0.0))
        }
        _ => parts.swing,
    };

    swing * twist
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::axis_angle_deg;
    use proptest::prelude::*;

    const TOL: f64 = 1e-6;

    #[test]
    fn test_pure_twist() {
        let q = axis_angle_deg(&Vec3::x(), 40.0);
        let parts = SwingTwist::decompose(&q, &Vec3::x());
        assert!(parts.swing_angle() < TOL);
        assert!((parts.twist_angle(&Vec3::x()).to_degrees() - 40.0).abs() < TOL);
    }

    #[test]
    fn test_pure_swing() {
        let q = axis_angle_deg(&Vec3::z(), 30.0);
        let parts = SwingTwist::decompose(&q, &Vec3::x());
        assert!(parts.twist_angle(&Vec3::x()).abs() < TOL);
        assert!((parts.swing_angle().to_degrees() - 30.0).abs() < TOL);
    }

    #[test]
    fn test_negative_twist_sign() {
        let q = axis_angle_deg(&Vec3::x(), -70.0);
        let parts = SwingTwist::decompose(&q, &Vec3::x());
        assert!((parts.twist_angle(&Vec3::x()).to_degrees() + 70.0).abs() < TOL);
    }

    #[test]
    fn test_half_turn_swing_is_degenerate_twist() {
        let q = axis_angle_deg(&Vec3::y(), 180.0);
        let parts = SwingTwist::decompose(&q, &Vec3::x());
        assert_eq!(parts.twist, Quat::identity());
        assert!(parts.recompose().angle_to(&q) < TOL);
    }

    #[test]
    fn test_clamp_limits_swing_and_twist() {
        let q = axis_angle_deg(&Vec3::z(), 80.0) * axis_angle_deg(&Vec3::x(), 60.0);
        let clamped = clamp_swing_twist(
            &q,
            &Vec3::x(),
            (-15.0f64).to_radians(),
            15.0f64.to_radians(),
            25.0f64.to_radians(),
        );
        let parts = SwingTwist::decompose(&clamped, &Vec3::x());
        assert!((parts.swing_angle().to_degrees() - 25.0).abs() < TOL);
        assert!((parts.twist_angle(&Vec3::x()).to_degrees() - 15.0).abs() < TOL);
    }

    #[test]
    fn test_clamp_leaves_rotation_within_limits() {
        let q = axis_angle_deg(&Vec3::z(), 10.0) * axis_angle_deg(&Vec3::x(), 5.0);
        let clamped = clamp_swing_twist(&q, &Vec3::x(), -0.5, 0.5, 0.5);
        assert!(clamped.angle_to(&q) < TOL);
    }

    fn arb_rotation() -> impl Strategy<Value = Quat> {
        (-1.0f64..1.0, -1.0f64..1.0, -1.0f64..1.0, -1.0f64..1.0)
            .prop_filter("non-degenerate quaternion", |(w, i, j, k)| {
                (w * w + i * i + j * j + k * k).sqrt() > 0.1
            })
            .prop_map(|(w, i, j, k)| Quat::new_normalize(Quaternion::new(w, i, j, k)))
    }

    fn arb_axis() -> impl Strategy<Value = Vec3> {
        (-1.0f64..1.0, -1.0f64..1.0, -1.0f64..1.0)
            .prop_map(|(x, y, z)| Vec3::new(x, y, z))
            .prop_filter("non-zero axis", |v| v.norm() > 0.05)
    }

    proptest! {
        #[test]
        fn prop_decompose_recompose_round_trip(q in arb_rotation(), axis in arb_axis()) {
            let parts = SwingTwist::decompose(&q, &axis);
            prop_assert!(parts.recompose().angle_to(&q) < TOL);
        }

        #[test]
        fn prop_twist_is_about_axis(q in arb_rotation(), axis in arb_axis()) {
            let parts = SwingTwist::decompose(&q, &axis);
            let unit = axis.normalize();
            prop_assert!((parts.twist * unit - unit).norm() < 1e-6);
        }

        #[test]
        fn prop_clamp_is_idempotent(
            q in arb_rotation(),
            axis in arb_axis(),
            twist_limit in 0.05f64..1.5,
            swing_limit in 0.05f64..2.5,
        ) {
            let once = clamp_swing_twist(&q, &axis, -twist_limit, twist_limit, swing_limit);
            let twice = clamp_swing_twist(&once, &axis, -twist_limit, twist_limit, swing_limit);
            prop_assert!(once.angle_to(&twice) < 1e-6);
        }
    }
}
