//! End-to-end tests for a four-bone arm driven through the pose accumulator.
//!
//! The chain is shoulder -> upperArm -> forearm -> hand with rest offsets along
//! +X. Observations aim the forearm straight up, 90 degrees away from rest,
//! which is far beyond the 25 degree swing cap of a distal bone.

use std::collections::BTreeMap;

use kinetrack_rig::math::angle_between_deg;
use kinetrack_rig::{AccumulatorConfig, ConstraintProfile, PoseAccumulator, Skeleton, Vec3};

const TOL: f64 = 1e-4;

fn arm_chain() -> Skeleton {
    let mut skeleton = Skeleton::new();
    skeleton.add_bone("shoulder", None, Vec3::zeros());
    skeleton.add_bone("upperArm", Some("shoulder"), Vec3::new(0.3, 0.0, 0.0));
    skeleton.add_bone("forearm", Some("upperArm"), Vec3::new(0.25, 0.0, 0.0));
    skeleton.add_bone("hand", Some("forearm"), Vec3::new(0.2, 0.0, 0.0));
    skeleton
}

/// Forearm and hand observed directly above the elbow.
fn upward_batch() -> BTreeMap<String, Vec3> {
    let mut batch = BTreeMap::new();
    batch.insert("forearm".to_string(), Vec3::new(0.3, 0.25, 0.0));
    batch.insert("hand".to_string(), Vec3::new(0.3, 0.45, 0.0));
    batch
}

fn forearm_direction(skeleton: &Skeleton) -> Vec3 {
    skeleton.bone("forearm").unwrap().local_rotation() * Vec3::x()
}

fn angle_between_dirs(a: &Vec3, b: &Vec3) -> f64 {
    a.normalize().dot(&b.normalize()).clamp(-1.0, 1.0).acos().to_degrees()
}

// ============================================================================
// Convergence
// ============================================================================

#[test]
fn test_forearm_swing_is_capped() {
    let mut skeleton = arm_chain();
    let mut acc = PoseAccumulator::with_defaults(&skeleton);
    let report = acc.add_training_sample(&skeleton, &upward_batch());
    assert_eq!(report.accepted, 2);

    let forearm = skeleton.id("forearm").unwrap();
    let target = acc.target_rotation(forearm).unwrap();
    let capped = Vec3::new(25f64.to_radians().cos(), 25f64.to_radians().sin(), 0.0);
    let aimed = target * Vec3::x();
    assert!((aimed - capped).norm() < TOL, "target aims at {:?}", aimed);

    acc.apply_learned_pose(&mut skeleton);
    let direction = forearm_direction(&skeleton);
    assert!(direction.y > 0.0, "forearm should swing toward +Y");
    assert!(angle_between_dirs(&direction, &Vec3::x()) <= 25.0 + TOL);
}

#[test]
fn test_repeated_batches_converge_monotonically() {
    let mut skeleton = arm_chain();
    let mut acc = PoseAccumulator::with_defaults(&skeleton);
    let forearm = skeleton.id("forearm").unwrap();
    let batch = upward_batch();

    let mut previous = f64::INFINITY;
    for _ in 0..40 {
        acc.add_training_sample(&skeleton, &batch);
        acc.apply_learned_pose(&mut skeleton);

        let applied = skeleton.get(forearm).unwrap().local_rotation();
        let target = acc.target_rotation(forearm).unwrap();
        let error = angle_between_deg(&applied, &target);
        assert!(error <= previous + 1e-9, "error grew: {} -> {}", previous, error);
        previous = error;

        // The raw target is 90 degrees up; the cap keeps at least 65 degrees.
        let to_raw = angle_between_dirs(&forearm_direction(&skeleton), &Vec3::y());
        assert!(to_raw >= 65.0 - TOL, "swing cap exceeded: {}", to_raw);
    }
    assert!(previous < 0.01, "did not converge: {}", previous);
}

#[test]
fn test_silence_keeps_last_pose() {
    let mut skeleton = arm_chain();
    let mut acc = PoseAccumulator::with_defaults(&skeleton);
    let batch = upward_batch();
    for _ in 0..150 {
        acc.add_training_sample(&skeleton, &batch);
        acc.apply_learned_pose(&mut skeleton);
    }
    let settled = skeleton.world_rotations();

    let empty: BTreeMap<String, Vec3> = BTreeMap::new();
    for _ in 0..10 {
        let report = acc.add_training_sample(&skeleton, &empty);
        assert_eq!(report.accepted, 0);
        acc.apply_learned_pose(&mut skeleton);
    }

    for (name, rotation) in skeleton.world_rotations() {
        assert!(
            angle_between_deg(&rotation, &settled[&name]) < 1e-6,
            "{} drifted without observations",
            name
        );
    }
}

// ============================================================================
// Buffer bound
// ============================================================================

#[test]
fn test_buffer_evicts_oldest_markers() {
    let skeleton = arm_chain();
    let config = AccumulatorConfig::default().with_buffer_size(3);
    let mut acc = PoseAccumulator::new(&skeleton, config, &ConstraintProfile::default()).unwrap();
    let forearm = skeleton.id("forearm").unwrap();

    for marker in 0..5 {
        let mut batch = BTreeMap::new();
        batch.insert("forearm".to_string(), Vec3::new(0.3, 1.0, 100.0 + marker as f64));
        acc.add_training_sample(&skeleton, &batch);
    }

    let positions = acc.position_samples(forearm).unwrap();
    assert_eq!(positions.len(), 3);
    assert_eq!(acc.rotation_samples(forearm).unwrap().len(), 3);
    let markers: Vec<f64> = positions.iter().map(|p| p.z).collect();
    assert_eq!(markers, vec![102.0, 103.0, 104.0]);
}

// ============================================================================
// Independent instances
// ============================================================================

#[test]
fn test_accumulators_do_not_share_state() {
    let mut a = arm_chain();
    let mut b = arm_chain();
    let mut acc_a = PoseAccumulator::with_defaults(&a);
    let mut acc_b = PoseAccumulator::with_defaults(&b);

    acc_a.add_training_sample(&a, &upward_batch());
    acc_a.apply_learned_pose(&mut a);
    acc_b.apply_learned_pose(&mut b);

    assert!(forearm_direction(&a).y > 0.0);
    assert_eq!(forearm_direction(&b), Vec3::x());
}
