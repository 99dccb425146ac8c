//! Per-limb frame driver.
//!
//! A [`LimbTracker`] owns one skeleton with its pose accumulator and
//! predictive filter. Every frame it is handed whatever its streams produced
//! since the last frame; when the streams fall silent it keeps the limb moving
//! on predictions for a while, then reports it unobserved.

use std::collections::{BTreeMap, HashMap};

use kinetrack_predict::{JointId, KalmanConfig, KalmanFilter3, PredictiveFilter};
use kinetrack_rig::presets::{self, bone_name, Side};
use kinetrack_rig::{AccumulatorConfig, PoseAccumulator, SampleReport, Skeleton, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{ConfigError, CoordinateTransform, TrackerConfig};
use crate::ingest::{Observation, Stream};

/// Outcome of one [`LimbTracker::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickReport {
    /// Fresh observations were applied.
    Observed { sample: SampleReport, written: usize },
    /// The streams are stalled; predictions were applied instead.
    Predicted { joints: usize, written: usize },
    /// Silent past the timeout; the pose is left as is.
    TimedOut,
    /// Nothing to do this frame.
    Idle,
}

/// Tick counters for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickStats {
    pub observed: usize,
    pub predicted: usize,
    pub timed_out: usize,
    pub idle: usize,
    /// Observations folded into bone buffers.
    pub accepted: usize,
    /// Observations skipped by the accumulator.
    pub skipped: usize,
}

impl TickStats {
    fn record(&mut self, report: &TickReport) {
        match report {
            TickReport::Observed { sample, .. } => {
                self.observed += 1;
                self.accepted += sample.accepted;
                self.skipped += sample.skipped();
            }
            TickReport::Predicted { .. } => self.predicted += 1,
            TickReport::TimedOut => self.timed_out += 1,
            TickReport::Idle => self.idle += 1,
        }
    }
}

/// Drives one skeleton from one or more observation streams.
#[derive(Debug)]
pub struct LimbTracker {
    name: String,
    streams: Vec<Stream>,
    skeleton: Skeleton,
    accumulator: PoseAccumulator,
    filter: PredictiveFilter,
    transform: CoordinateTransform,
    kalman: Option<KalmanConfig>,
    smoothers: HashMap<String, KalmanFilter3>,
    joints: BTreeMap<JointId, String>,
    predicted: BTreeMap<String, Vec3>,
    stall_after: f64,
    timeout: f64,
    lookahead: f64,
    last_observed: Option<f64>,
    timed_out: bool,
    stats: TickStats,
}

impl LimbTracker {
    /// Tracker over `skeleton`, fed by `streams`.
    pub fn new(
        name: impl Into<String>,
        streams: Vec<Stream>,
        skeleton: Skeleton,
        accumulator: AccumulatorConfig,
        config: &TrackerConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let accumulator = PoseAccumulator::new(&skeleton, accumulator, &config.constraints)?;
        let filter = PredictiveFilter::new(config.predictor.clone())?;
        Ok(Self {
            name: name.into(),
            streams,
            skeleton,
            accumulator,
            filter,
            transform: config.transform,
            kalman: config.kalman,
            smoothers: HashMap::new(),
            joints: BTreeMap::new(),
            predicted: BTreeMap::new(),
            stall_after: config.stall_after,
            timeout: config.timeout,
            lookahead: config.lookahead,
            last_observed: None,
            timed_out: false,
            stats: TickStats::default(),
        })
    }

    /// Arm with a full hand, fed by the hand and pose streams of `side`.
    pub fn arm(side: Side, config: &TrackerConfig) -> Result<Self, ConfigError> {
        let mut skeleton = presets::arm(side);
        presets::add_fingers(&mut skeleton, side, &bone_name("hand", side));
        let streams = match side {
            Side::Left => vec![Stream::LeftHand, Stream::LeftPose],
            Side::Right => vec![Stream::RightHand, Stream::RightPose],
        };
        Self::new(
            format!("{}_arm", side.as_str()),
            streams,
            skeleton,
            config.accumulator.clone(),
            config,
        )
    }

    /// Spine to head, fed by the body stream.
    pub fn body(config: &TrackerConfig) -> Result<Self, ConfigError> {
        Self::new(
            "body",
            vec![Stream::Body],
            presets::torso(),
            config.body_accumulator(),
            config,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub fn filter(&self) -> &PredictiveFilter {
        &self.filter
    }

    pub fn stats(&self) -> TickStats {
        self.stats
    }

    /// Joints seen so far and the bones they drive.
    pub fn joints(&self) -> &BTreeMap<JointId, String> {
        &self.joints
    }

    /// Targets applied by the latest predicted tick, keyed by bone.
    pub fn predicted_targets(&self) -> &BTreeMap<String, Vec3> {
        &self.predicted
    }

    /// Blocks until background model training has finished.
    pub fn wait_for_training(&mut self) {
        self.filter.wait_for_training();
    }

    /// Advances one frame at time `now` (seconds).
    pub fn tick(&mut self, batch: &[Observation], now: f64) -> TickReport {
        let report = if !batch.is_empty() {
            self.observe(batch, now)
        } else {
            match self.last_observed.map(|last| now - last) {
                Some(silence) if silence > self.timeout => {
                    if !self.timed_out {
                        info!(tracker = %self.name, silence, "stream timed out");
                        self.timed_out = true;
                    }
                    TickReport::TimedOut
                }
                Some(silence) if silence > self.stall_after => self.predict(silence),
                _ => TickReport::Idle,
            }
        };
        self.stats.record(&report);
        debug!(tracker = %self.name, now, ?report, "tick");
        report
    }

    fn observe(&mut self, batch: &[Observation], now: f64) -> TickReport {
        let mut positions: BTreeMap<String, Vec3> = BTreeMap::new();
        let mut observed: BTreeMap<JointId, String> = BTreeMap::new();
        for observation in batch {
            let mut position = self.transform.apply(&observation.position);
            if let Some(config) = self.kalman {
                position = self
                    .smoothers
                    .entry(observation.bone.clone())
                    .or_insert_with(|| KalmanFilter3::starting_at(config, position))
                    .filter(&position);
            }
            positions.insert(observation.bone.clone(), position);
            observed.insert(observation.joint, observation.bone.clone());
        }

        let sample = self.accumulator.add_training_sample(&self.skeleton, &positions);
        let written = self.accumulator.apply_learned_pose(&mut self.skeleton);

        for (joint, bone) in &observed {
            let Some(id) = self.skeleton.id(bone) else {
                continue;
            };
            if let Some((position, rotation)) = self.skeleton.world_transform(id) {
                self.filter.update_position(*joint, position, now);
                self.filter.update_rotation(*joint, rotation, now);
                self.joints.insert(*joint, bone.clone());
            }
        }

        if self.timed_out {
            info!(tracker = %self.name, "stream resumed");
        }
        self.last_observed = Some(now);
        self.timed_out = false;
        self.predicted.clear();
        TickReport::Observed { sample, written }
    }

    /// Predicts every known joint `lookahead` seconds past now, measured
    /// from its last sample `silence` seconds ago.
    fn predict(&mut self, silence: f64) -> TickReport {
        let horizon = silence + self.lookahead;
        let predicted: BTreeMap<String, Vec3> = self
            .joints
            .iter()
            .map(|(joint, bone)| (bone.clone(), self.filter.predict_position(*joint, horizon)))
            .collect();
        if predicted.is_empty() {
            return TickReport::Idle;
        }
        self.accumulator.add_training_sample(&self.skeleton, &predicted);
        let written = self.accumulator.apply_learned_pose(&mut self.skeleton);
        let joints = predicted.len();
        self.predicted = predicted;
        TickReport::Predicted { joints, written }
    }
}
