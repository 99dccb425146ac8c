//! Vector and quaternion helpers shared by the rig and the predictor.
//!
//! Everything here is double precision `nalgebra`. Interpolation helpers never
//! panic: ambiguous configurations fall back to a normalized lerp along the
//! shortest arc.

use nalgebra::{Quaternion, Unit, UnitQuaternion, Vector3};

/// 3D vector used for positions, offsets, and directions.
pub type Vec3 = Vector3<f64>;

/// Unit quaternion used for every rotation.
pub type Quat = UnitQuaternion<f64>;

/// Directions shorter than this are treated as degenerate.
pub const DIRECTION_EPSILON: f64 = 1e-6;

/// Below this cross-product magnitude a look direction is considered parallel
/// to the requested up vector.
const PARALLEL_EPSILON: f64 = 1e-6;

/// Epsilon handed to `try_slerp`.
const SLERP_EPSILON: f64 = 1e-9;

// =============================================================================
// Construction
// =============================================================================

/// Rotation whose local +Z axis points along `forward` and whose local +Y axis
/// is as close to `up` as possible.
///
/// Returns `None` when `forward` is too short (or not finite) to define a
/// direction. When `forward` is parallel to `up` a substitute up vector is used.
pub fn look_rotation(forward: &Vec3, up: &Vec3) -> Option<Quat> {
    let length = forward.norm();
    if !(length > DIRECTION_EPSILON) || !length.is_finite() {
        return None;
    }
    let dir = forward / length;
    let up = if up.cross(&dir).norm() > PARALLEL_EPSILON {
        *up
    } else {
        substitute_up(&dir)
    };
    Some(Quat::face_towards(&dir, &up))
}

fn substitute_up(dir: &Vec3) -> Vec3 {
    if dir.z.abs() < 0.9 {
        Vec3::z()
    } else {
        Vec3::x()
    }
}

/// World rotation that carries `rest_axis` onto `direction`, with roll fixed by
/// the look-at frames of both vectors around `up`.
///
/// An observation that matches the rest axis yields the identity.
pub fn align_rotation(rest_axis: &Vec3, direction: &Vec3, up: &Vec3) -> Option<Quat> {
    let target = look_rotation(direction, up)?;
    let rest = look_rotation(rest_axis, up)?;
    Some(target * rest.inverse())
}

/// Rotation of `angle_deg` degrees around `axis`. A zero axis yields identity.
pub fn axis_angle_deg(axis: &Vec3, angle_deg: f64) -> Quat {
    match Unit::try_new(*axis, DIRECTION_EPSILON) {
        Some(axis) => Quat::from_axis_angle(&axis, angle_deg.to_radians()),
        None => Quat::identity(),
    }
}

// =============================================================================
// Interpolation
// =============================================================================

/// Linear interpolation between two points.
pub fn lerp(from: &Vec3, to: &Vec3, t: f64) -> Vec3 {
    from + (to - from) * t
}

/// Spherical interpolation along the shortest arc.
pub fn slerp(from: &Quat, to: &Quat, t: f64) -> Quat {
    from.try_slerp(to, t, SLERP_EPSILON)
        .unwrap_or_else(|| nlerp(from, to, t))
}

/// Normalized linear interpolation along the shortest arc.
pub fn nlerp(from: &Quat, to: &Quat, t: f64) -> Quat {
    let a = from.quaternion().coords;
    let mut b = to.quaternion().coords;
    if a.dot(&b) < 0.0 {
        b = -b;
    }
    let blended = a + (b - a) * t;
    if blended.norm() <= f64::EPSILON {
        return *from;
    }
    Quat::new_normalize(Quaternion::from_vector(blended))
}

/// Angle between two rotations in degrees, in `[0, 180]`.
pub fn angle_between_deg(a: &Quat, b: &Quat) -> f64 {
    a.angle_to(b).to_degrees()
}

/// Folds an angle in radians into `(-PI, PI]`.
pub fn wrap_angle(angle: f64) -> f64 {
    use std::f64::consts::{PI, TAU};
    let mut wrapped = angle % TAU;
    if wrapped > PI {
        wrapped -= TAU;
    } else if wrapped <= -PI {
        wrapped += TAU;
    }
    wrapped
}

// =============================================================================
// Averaging
// =============================================================================

/// Iterative slerp fold: `avg = slerp(avg, q_i, 1 / (i + 1))`.
///
/// This approximates the spherical mean and is order dependent; later samples
/// carry more weight when the inputs are unevenly spaced. Empty input yields
/// the identity.
pub fn average_rotations<'a, I>(rotations: I) -> Quat
where
    I: IntoIterator<Item = &'a Quat>,
{
    let mut iter = rotations.into_iter();
    let Some(first) = iter.next() else {
        return Quat::identity();
    };
    iter.enumerate().fold(*first, |avg, (i, next)| {
        slerp(&avg, next, 1.0 / (i as f64 + 2.0))
    })
}

/// Arithmetic mean. Empty input yields the origin.
pub fn average_positions<'a, I>(positions: I) -> Vec3
where
    I: IntoIterator<Item = &'a Vec3>,
{
    let (sum, count) = positions
        .into_iter()
        .fold((Vec3::zeros(), 0usize), |(sum, count), p| (sum + p, count + 1));
    if count == 0 {
        Vec3::zeros()
    } else {
        sum / count as f64
    }
}

/// Returns true when every component is finite.
pub fn is_finite(v: &Vec3) -> bool {
    v.iter().all(|c| c.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_vec_close(a: &Vec3, b: &Vec3, tol: f64) {
        assert!((a - b).norm() < tol, "expected {:?}, got {:?}", b, a);
    }

    #[test]
    fn test_look_rotation_maps_z_to_forward() {
        let forward = Vec3::new(1.0, 0.0, 1.0);
        let q = look_rotation(&forward, &Vec3::y()).unwrap();
        assert_vec_close(&(q * Vec3::z()), &forward.normalize(), 1e-9);
        // Up stays in the plane spanned by forward and world up.
        assert!((q * Vec3::y()).y > 0.0);
    }

    #[test]
    fn test_look_rotation_rejects_zero_direction() {
        assert!(look_rotation(&Vec3::zeros(), &Vec3::y()).is_none());
        assert!(look_rotation(&Vec3::new(f64::NAN, 0.0, 0.0), &Vec3::y()).is_none());
    }

    #[test]
    fn test_look_rotation_parallel_to_up() {
        let q = look_rotation(&Vec3::y(), &Vec3::y()).unwrap();
        assert_vec_close(&(q * Vec3::z()), &Vec3::y(), 1e-9);
    }

    #[test]
    fn test_align_rotation_identity_at_rest() {
        let axis = Vec3::new(0.3, 0.0, 0.0);
        let q = align_rotation(&axis, &axis, &Vec3::y()).unwrap();
        assert!(q.angle() < 1e-9);
    }

    #[test]
    fn test_align_rotation_carries_rest_axis() {
        let q = align_rotation(&Vec3::x(), &Vec3::new(0.0, 1.0, 1.0), &Vec3::y()).unwrap();
        assert_vec_close(&(q * Vec3::x()), &Vec3::new(0.0, 1.0, 1.0).normalize(), 1e-9);
    }

    #[test]
    fn test_slerp_identical_inputs() {
        let q = axis_angle_deg(&Vec3::z(), 30.0);
        let r = slerp(&q, &q, 0.5);
        assert!(r.angle_to(&q) < 1e-12);
    }

    #[test]
    fn test_slerp_halfway() {
        let a = Quat::identity();
        let b = axis_angle_deg(&Vec3::z(), 90.0);
        let mid = slerp(&a, &b, 0.5);
        assert!((angle_between_deg(&a, &mid) - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_average_rotations_of_identical_samples() {
        let q = axis_angle_deg(&Vec3::x(), 20.0);
        let avg = average_rotations(&[q, q, q, q]);
        assert!(angle_between_deg(&avg, &q) < 1e-9);
        assert_eq!(average_rotations(&[]), Quat::identity());
    }

    #[test]
    fn test_average_rotations_two_samples_is_midpoint() {
        let a = Quat::identity();
        let b = axis_angle_deg(&Vec3::y(), 60.0);
        let avg = average_rotations(&[a, b]);
        assert!((angle_between_deg(&a, &avg) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_average_positions() {
        let avg = average_positions(&[Vec3::new(1.0, 0.0, 0.0), Vec3::new(3.0, 2.0, 0.0)]);
        assert_vec_close(&avg, &Vec3::new(2.0, 1.0, 0.0), 1e-12);
        assert_eq!(average_positions(&[]), Vec3::zeros());
    }

    #[test]
    fn test_wrap_angle() {
        use std::f64::consts::PI;
        assert!((wrap_angle(1.5 * PI) + 0.5 * PI).abs() < 1e-12);
        assert!((wrap_angle(PI) - PI).abs() < 1e-12);
        assert!((wrap_angle(-PI) - PI).abs() < 1e-12);
        assert!((wrap_angle(0.25) - 0.25).abs() < 1e-12);
    }
}
