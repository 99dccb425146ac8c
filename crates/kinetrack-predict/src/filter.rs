//! Per-joint predictive filter.
//!
//! Each joint keeps two bounded, timestamped histories (positions and
//! rotations). A prediction is the kinematic extrapolation blended with the
//! output of a learned regression model, when one has been trained for the
//! joint.
//!
//! Training examples accumulate per joint. Once a batch is full it is handed
//! to a background thread; the resulting model is swapped in under a lock
//! that is also held while a prediction invokes the installed model, never
//! while training. Batches are numbered per joint and channel, and a model
//! only replaces one trained from an older batch, so a slow batch finishing
//! late cannot undo a newer one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use kinetrack_rig::math::{is_finite, lerp, slerp, Quat, Vec3};
use kinetrack_rig::RingBuffer;
use nalgebra::Quaternion;
use tracing::{debug, info, trace, warn};

use crate::config::{PredictorConfig, PredictorConfigError};
use crate::features::{
    latest_position_features, latest_rotation_features, position_example, rotation_example,
    TrainingExample, POSITION_OUTPUTS, ROTATION_OUTPUTS,
};
use crate::history::TimedSample;
use crate::kinematic::{extrapolate_position, extrapolate_rotation};
use crate::regression::{RegressionTrainer, Regressor, RidgeTrainer};

/// Integer joint identifier (landmark index).
pub type JointId = u32;

/// An installed model and the batch it was trained from.
struct Installed {
    batch: u64,
    model: Arc<dyn Regressor>,
}

type ModelStore = Arc<Mutex<HashMap<JointId, Installed>>>;

fn lock(store: &ModelStore) -> MutexGuard<'_, HashMap<JointId, Installed>> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Installs `candidate` unless the joint already holds a model from the same
/// or a later batch. Returns whether it was installed.
fn install_if_newer(store: &ModelStore, id: JointId, candidate: Installed) -> bool {
    let mut models = lock(store);
    if models
        .get(&id)
        .is_some_and(|current| current.batch >= candidate.batch)
    {
        return false;
    }
    models.insert(id, candidate);
    true
}

/// Which channel a model predicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Position,
    Rotation,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Position => "position",
            Channel::Rotation => "rotation",
        }
    }
}

struct JointState {
    positions: RingBuffer<TimedSample<Vec3>>,
    rotations: RingBuffer<TimedSample<Quat>>,
    position_examples: Vec<TrainingExample>,
    rotation_examples: Vec<TrainingExample>,
    /// Training batches started so far, per channel.
    position_batches: u64,
    rotation_batches: u64,
}

impl JointState {
    fn new(capacity: usize) -> Self {
        Self {
            positions: RingBuffer::new(capacity),
            rotations: RingBuffer::new(capacity),
            position_examples: Vec::new(),
            rotation_examples: Vec::new(),
            position_batches: 0,
            rotation_batches: 0,
        }
    }

    fn batches(&self, channel: Channel) -> u64 {
        match channel {
            Channel::Position => self.position_batches,
            Channel::Rotation => self.rotation_batches,
        }
    }
}

/// Kinematic and blended estimates for one request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionEstimate {
    pub kinematic: Vec3,
    /// Regression output, when a usable model exists.
    pub learned: Option<Vec3>,
    pub blended: Vec3,
}

/// Kinematic and blended estimates for one request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationEstimate {
    pub kinematic: Quat,
    pub learned: Option<Quat>,
    pub blended: Quat,
}

/// Per-joint position and rotation predictor.
pub struct PredictiveFilter {
    config: PredictorConfig,
    trainer: Arc<dyn RegressionTrainer>,
    joints: HashMap<JointId, JointState>,
    position_models: ModelStore,
    rotation_models: ModelStore,
    workers: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for PredictiveFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictiveFilter")
            .field("config", &self.config)
            .field("joints", &self.joints.len())
            .field("workers", &self.workers.len())
            .finish()
    }
}

impl PredictiveFilter {
    /// Filter using the default ridge trainer.
    pub fn new(config: PredictorConfig) -> Result<Self, PredictorConfigError> {
        let trainer = Arc::new(RidgeTrainer::new(config.ridge_lambda));
        Self::with_trainer(config, trainer)
    }

    /// Filter using a custom trainer.
    pub fn with_trainer(
        config: PredictorConfig,
        trainer: Arc<dyn RegressionTrainer>,
    ) -> Result<Self, PredictorConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            trainer,
            joints: HashMap::new(),
            position_models: Arc::new(Mutex::new(HashMap::new())),
            rotation_models: Arc::new(Mutex::new(HashMap::new())),
            workers: Vec::new(),
        })
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    fn joint_mut(&mut self, id: JointId) -> &mut JointState {
        let capacity = self.config.history_capacity();
        self.joints
            .entry(id)
            .or_insert_with(|| JointState::new(capacity))
    }

    // -------------------------------------------------------------------------
    // Updates
    // -------------------------------------------------------------------------

    /// Records a position. Non-finite positions are dropped; returns whether
    /// the sample was kept.
    pub fn update_position(&mut self, id: JointId, position: Vec3, time: f64) -> bool {
        if !is_finite(&position) {
            trace!(joint = id, "non-finite position dropped");
            return false;
        }
        let (default_dt, batch) = (self.config.default_dt, self.config.train_batch_size);
        let joint = self.joint_mut(id);
        joint.positions.push(TimedSample::new(position, time));

        if joint.positions.is_full() {
            let history = joint.positions.to_vec();
            if let Some(example) = position_example(&history, default_dt) {
                joint.position_examples.push(example);
            }
            if joint.position_examples.len() >= batch {
                let examples = std::mem::take(&mut joint.position_examples);
                joint.position_batches += 1;
                let number = joint.position_batches;
                self.spawn_training(Channel::Position, id, number, examples);
            }
        }
        true
    }

    /// Records a rotation. Rotations are taken as given.
    pub fn update_rotation(&mut self, id: JointId, rotation: Quat, time: f64) {
        let (default_dt, batch) = (self.config.default_dt, self.config.train_batch_size);
        let joint = self.joint_mut(id);
        joint.rotations.push(TimedSample::new(rotation, time));

        if joint.rotations.is_full() {
            let history = joint.rotations.to_vec();
            if let Some(example) = rotation_example(&history, default_dt) {
                joint.rotation_examples.push(example);
            }
            if joint.rotation_examples.len() >= batch {
                let examples = std::mem::take(&mut joint.rotation_examples);
                joint.rotation_batches += 1;
                let number = joint.rotation_batches;
                self.spawn_training(Channel::Rotation, id, number, examples);
            }
        }
    }

    fn store(&self, channel: Channel) -> &ModelStore {
        match channel {
            Channel::Position => &self.position_models,
            Channel::Rotation => &self.rotation_models,
        }
    }

    fn spawn_training(
        &mut self,
        channel: Channel,
        id: JointId,
        batch: u64,
        examples: Vec<TrainingExample>,
    ) {
        let trainer = Arc::clone(&self.trainer);
        let store = Arc::clone(self.store(channel));
        let name = format!("kinetrack-train-{}-{}", channel.as_str(), id);

        let spawned = thread::Builder::new().name(name).spawn(move || {
            let count = examples.len();
            match trainer.train(&examples) {
                Some(model) => {
                    if install_if_newer(&store, id, Installed { batch, model }) {
                        info!(
                            joint = id,
                            channel = channel.as_str(),
                            batch,
                            examples = count,
                            "installed retrained model"
                        );
                    } else {
                        debug!(
                            joint = id,
                            channel = channel.as_str(),
                            batch,
                            "discarding model from a superseded batch"
                        );
                    }
                }
                None => {
                    warn!(
                        joint = id,
                        channel = channel.as_str(),
                        examples = count,
                        "training produced no model, keeping the previous one"
                    );
                }
            }
        });

        match spawned {
            Ok(handle) => {
                self.workers.retain(|worker| !worker.is_finished());
                self.workers.push(handle);
            }
            Err(err) => warn!(joint = id, error = %err, "failed to spawn training thread"),
        }
    }

    /// Blocks until every outstanding training thread has finished.
    pub fn wait_for_training(&mut self) {
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("training thread panicked");
            }
        }
    }

    // -------------------------------------------------------------------------
    // Models
    // -------------------------------------------------------------------------

    /// Installs a model directly, e.g. one loaded from disk.
    ///
    /// The model replaces whatever is installed. Batches already in training
    /// are discarded when they finish; later batches replace it as usual.
    pub fn install_model(&self, channel: Channel, id: JointId, model: Arc<dyn Regressor>) {
        let batch = self.joints.get(&id).map_or(0, |j| j.batches(channel));
        lock(self.store(channel)).insert(id, Installed { batch, model });
    }

    /// Currently installed model.
    pub fn model(&self, channel: Channel, id: JointId) -> Option<Arc<dyn Regressor>> {
        lock(self.store(channel))
            .get(&id)
            .map(|installed| Arc::clone(&installed.model))
    }

    pub fn has_model(&self, channel: Channel, id: JointId) -> bool {
        lock(self.store(channel)).contains_key(&id)
    }

    fn run_model(&self, channel: Channel, id: JointId, features: &[f64]) -> Option<Vec<f64>> {
        let models = lock(self.store(channel));
        models.get(&id)?.model.predict(features)
    }

    // -------------------------------------------------------------------------
    // Predictions
    // -------------------------------------------------------------------------

    /// Kinematic and blended position `delta` seconds after the last sample.
    ///
    /// Unknown joints yield the origin.
    pub fn estimate_position(&self, id: JointId, delta: f64) -> PositionEstimate {
        let Some(joint) = self.joints.get(&id) else {
            return PositionEstimate {
                kinematic: Vec3::zeros(),
                learned: None,
                blended: Vec3::zeros(),
            };
        };
        let history = joint.positions.to_vec();
        let default_dt = self.config.default_dt;
        let kinematic =
            extrapolate_position(&history, delta, default_dt).unwrap_or_else(Vec3::zeros);

        let learned = latest_position_features(&history, default_dt)
            .and_then(|features| self.run_model(Channel::Position, id, &features))
            .and_then(|output| {
                if output.len() < POSITION_OUTPUTS {
                    return None;
                }
                let value = Vec3::new(output[0], output[1], output[2]);
                if is_finite(&value) {
                    Some(value)
                } else {
                    debug!(joint = id, "non-finite model output, using kinematic estimate");
                    None
                }
            });

        let blended = match learned {
            Some(value) => lerp(&kinematic, &value, self.config.regression_weight),
            None => kinematic,
        };
        PositionEstimate {
            kinematic,
            learned,
            blended,
        }
    }

    /// Kinematic and blended rotation `delta` seconds after the last sample.
    ///
    /// Unknown joints yield the identity.
    pub fn estimate_rotation(&self, id: JointId, delta: f64) -> RotationEstimate {
        let Some(joint) = self.joints.get(&id) else {
            return RotationEstimate {
                kinematic: Quat::identity(),
                learned: None,
                blended: Quat::identity(),
            };
        };
        let history = joint.rotations.to_vec();
        let default_dt = self.config.default_dt;
        let kinematic =
            extrapolate_rotation(&history, delta, default_dt).unwrap_or_else(Quat::identity);

        let learned = latest_rotation_features(&history, default_dt)
            .and_then(|features| self.run_model(Channel::Rotation, id, &features))
            .and_then(|output| {
                if output.len() < ROTATION_OUTPUTS || output.iter().any(|c| !c.is_finite()) {
                    debug!(joint = id, "unusable model output, using kinematic estimate");
                    return None;
                }
                let raw = Quaternion::new(output[3], output[0], output[1], output[2]);
                Quat::try_new(raw, 1e-9)
            });

        let blended = match learned {
            Some(value) => slerp(&kinematic, &value, self.config.regression_weight),
            None => kinematic,
        };
        RotationEstimate {
            kinematic,
            learned,
            blended,
        }
    }

    /// Blended position prediction.
    pub fn predict_position(&self, id: JointId, delta: f64) -> Vec3 {
        self.estimate_position(id, delta).blended
    }

    /// Blended rotation prediction.
    pub fn predict_rotation(&self, id: JointId, delta: f64) -> Quat {
        self.estimate_rotation(id, delta).blended
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    /// Joints with any recorded sample, in ascending order.
    pub fn joint_ids(&self) -> Vec<JointId> {
        let mut ids: Vec<_> = self.joints.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of stored position samples for a joint.
    pub fn position_samples(&self, id: JointId) -> usize {
        self.joints.get(&id).map_or(0, |j| j.positions.len())
    }

    /// Number of stored rotation samples for a joint.
    pub fn rotation_samples(&self, id: JointId) -> usize {
        self.joints.get(&id).map_or(0, |j| j.rotations.len())
    }

    /// Examples waiting for the next batch.
    pub fn pending_examples(&self, channel: Channel, id: JointId) -> usize {
        self.joints.get(&id).map_or(0, |j| match channel {
            Channel::Position => j.position_examples.len(),
            Channel::Rotation => j.rotation_examples.len(),
        })
    }

    /// Last recorded position of a joint.
    pub fn last_position(&self, id: JointId) -> Option<Vec3> {
        self.joints
            .get(&id)
            .and_then(|j| j.positions.latest())
            .map(|s| s.value)
    }
}
