//! Integration tests for the predictive filter.
//!
//! These drive the public API end to end: sample intake, kinematic fallback,
//! background retraining, and blending of the installed models.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use kinetrack_predict::{
    Channel, PredictiveFilter, PredictorConfig, RegressionTrainer, Regressor, TrainingExample,
};
use kinetrack_rig::math::axis_angle_deg;
use kinetrack_rig::{Quat, Vec3};

// =============================================================================
// Helpers
// =============================================================================

fn wave(t: f64) -> Vec3 {
    Vec3::new(
        (t * 3.0).sin() * 0.2,
        (t * 2.0).cos() * 0.1 + 1.0,
        t * 0.05,
    )
}

fn feed_positions(filter: &mut PredictiveFilter, id: u32, count: usize) {
    for i in 0..count {
        let t = i as f64 * 0.02;
        assert!(filter.update_position(id, wave(t), t));
    }
}

fn feed_rotations(filter: &mut PredictiveFilter, id: u32, count: usize) {
    let axis = Vec3::new(0.2, 1.0, 0.1);
    for i in 0..count {
        let t = i as f64 * 0.02;
        filter.update_rotation(id, axis_angle_deg(&axis, 30.0 * (t * 4.0).sin()), t);
    }
}

/// Samples moving along x by one unit per step, so an example's label
/// tells which step it came from.
fn feed_steps(filter: &mut PredictiveFilter, id: u32, steps: std::ops::Range<usize>) {
    for i in steps {
        let t = i as f64 * 0.02;
        assert!(filter.update_position(id, Vec3::new(i as f64, 0.0, 0.0), t));
    }
}

/// Predicts the same value on every channel.
struct Constant(f64);

impl Regressor for Constant {
    fn predict(&self, _features: &[f64]) -> Option<Vec<f64>> {
        Some(vec![self.0; 3])
    }
}

fn installed_value(filter: &PredictiveFilter, id: u32) -> Option<Vec<f64>> {
    filter.model(Channel::Position, id)?.predict(&[])
}

/// Labels each model with its batch's first label; the first batch is slow.
struct SlowFirstBatchTrainer;

impl RegressionTrainer for SlowFirstBatchTrainer {
    fn train(&self, examples: &[TrainingExample]) -> Option<Arc<dyn Regressor>> {
        let first = examples.first()?.label[0];
        if first < 8.0 {
            thread::sleep(Duration::from_millis(300));
        }
        Some(Arc::new(Constant(first)))
    }
}

/// Blocks inside `train` until the test lets it finish.
struct GatedTrainer {
    started: Barrier,
    release: Barrier,
    value: f64,
}

impl RegressionTrainer for GatedTrainer {
    fn train(&self, _examples: &[TrainingExample]) -> Option<Arc<dyn Regressor>> {
        self.started.wait();
        self.release.wait();
        Some(Arc::new(Constant(self.value)))
    }
}

struct CountingTrainer {
    calls: AtomicUsize,
}

impl RegressionTrainer for CountingTrainer {
    fn train(&self, _examples: &[TrainingExample]) -> Option<Arc<dyn Regressor>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        None
    }
}

// =============================================================================
// Kinematic behaviour
// =============================================================================

#[test]
fn test_one_sample_predicts_itself() {
    let mut filter = PredictiveFilter::new(PredictorConfig::default()).unwrap();
    filter.update_position(7, Vec3::new(1.0, 2.0, 3.0), 0.0);
    assert_eq!(filter.predict_position(7, 0.1), Vec3::new(1.0, 2.0, 3.0));
}

#[test]
fn test_unknown_joint_predicts_defaults() {
    let filter = PredictiveFilter::new(PredictorConfig::default()).unwrap();
    assert_eq!(filter.predict_position(42, 0.05), Vec3::zeros());
    assert_eq!(filter.predict_rotation(42, 0.05), Quat::identity());
    assert!(filter.joint_ids().is_empty());
}

#[test]
fn test_nan_sample_does_not_disturb_prediction() {
    let mut filter = PredictiveFilter::new(PredictorConfig::default()).unwrap();
    feed_positions(&mut filter, 0, 5);
    let before = filter.predict_position(0, 0.05);
    assert!(!filter.update_position(0, Vec3::new(f64::NAN, 0.0, 0.0), 0.1));
    assert_eq!(filter.predict_position(0, 0.05), before);
}

#[test]
fn test_invalid_config_is_rejected() {
    assert!(PredictiveFilter::new(PredictorConfig::default().with_history_length(2)).is_err());
    assert!(PredictiveFilter::new(PredictorConfig::default().with_regression_weight(1.5)).is_err());
}

// =============================================================================
// Background training
// =============================================================================

#[test]
fn test_position_model_trains_and_blends() {
    let config = PredictorConfig::default().with_train_batch_size(8);
    let mut filter = PredictiveFilter::new(config).unwrap();
    feed_positions(&mut filter, 3, 20);
    filter.wait_for_training();

    assert!(filter.has_model(Channel::Position, 3));
    assert!(!filter.has_model(Channel::Position, 4));

    let estimate = filter.estimate_position(3, 0.02);
    let learned = estimate.learned.expect("model output");
    assert!(learned.iter().all(|c| c.is_finite()));
    let expected = estimate.kinematic + (learned - estimate.kinematic) * 0.3;
    assert!((estimate.blended - expected).norm() < 1e-9);
}

#[test]
fn test_rotation_model_trains_and_blends() {
    let config = PredictorConfig::default().with_train_batch_size(8);
    let mut filter = PredictiveFilter::new(config).unwrap();
    feed_rotations(&mut filter, 1, 20);
    filter.wait_for_training();

    assert!(filter.has_model(Channel::Rotation, 1));
    let estimate = filter.estimate_rotation(1, 0.02);
    let blended = estimate.blended;
    assert!(blended.coords.iter().all(|c| c.is_finite()));
    assert!((blended.norm() - 1.0).abs() < 1e-9);
    if let Some(learned) = estimate.learned {
        let total = estimate.kinematic.angle_to(&learned);
        assert!(estimate.kinematic.angle_to(&blended) <= total + 1e-9);
    }
}

#[test]
fn test_failed_training_keeps_kinematic_estimate() {
    let trainer = Arc::new(CountingTrainer {
        calls: AtomicUsize::new(0),
    });
    let config = PredictorConfig::default().with_train_batch_size(4);
    let mut filter = PredictiveFilter::with_trainer(config, trainer.clone()).unwrap();

    feed_positions(&mut filter, 0, 15);
    filter.wait_for_training();

    // Examples start once seven samples are stored: 9 examples, 2 batches.
    assert_eq!(trainer.calls.load(Ordering::SeqCst), 2);
    assert_eq!(filter.pending_examples(Channel::Position, 0), 1);
    assert!(!filter.has_model(Channel::Position, 0));

    let estimate = filter.estimate_position(0, 0.02);
    assert_eq!(estimate.learned, None);
    assert_eq!(estimate.blended, estimate.kinematic);
}

#[test]
fn test_joints_are_independent() {
    let config = PredictorConfig::default().with_train_batch_size(8);
    let mut filter = PredictiveFilter::new(config).unwrap();
    feed_positions(&mut filter, 0, 20);
    filter.update_position(9, Vec3::new(5.0, 5.0, 5.0), 0.0);
    filter.wait_for_training();

    assert_eq!(filter.joint_ids(), vec![0, 9]);
    assert!(filter.has_model(Channel::Position, 0));
    assert!(!filter.has_model(Channel::Position, 9));
    assert_eq!(filter.predict_position(9, 0.5), Vec3::new(5.0, 5.0, 5.0));
}

#[test]
fn test_late_batch_does_not_replace_newer_model() {
    let config = PredictorConfig::default().with_train_batch_size(4);
    let mut filter =
        PredictiveFilter::with_trainer(config, Arc::new(SlowFirstBatchTrainer)).unwrap();

    // Steps 6..=9 form the first batch, steps 10..=13 the second.
    feed_steps(&mut filter, 0, 0..15);
    filter.wait_for_training();

    assert_eq!(installed_value(&filter, 0), Some(vec![10.0; 3]));
}

#[test]
fn test_retraining_replaces_installed_model() {
    let trainer = Arc::new(GatedTrainer {
        started: Barrier::new(2),
        release: Barrier::new(2),
        value: 2.0,
    });
    let config = PredictorConfig::default().with_train_batch_size(4);
    let mut filter = PredictiveFilter::with_trainer(config, trainer.clone()).unwrap();

    feed_steps(&mut filter, 0, 0..6);
    filter.install_model(Channel::Position, 0, Arc::new(Constant(1.0)));

    // Four more steps fill one batch and start training.
    feed_steps(&mut filter, 0, 6..10);
    trainer.started.wait();

    // Predictions during training use the installed model.
    assert_eq!(
        filter.estimate_position(0, 0.02).learned,
        Some(Vec3::new(1.0, 1.0, 1.0))
    );

    trainer.release.wait();
    filter.wait_for_training();
    assert_eq!(
        filter.estimate_position(0, 0.02).learned,
        Some(Vec3::new(2.0, 2.0, 2.0))
    );
}
