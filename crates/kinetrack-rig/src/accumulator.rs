//! Buffered, constrained pose smoothing.
//!
//! The [`PoseAccumulator`] turns raw world-space joint positions into
//! joint-local rotations in two phases per frame:
//!
//! 1. [`PoseAccumulator::add_training_sample`] converts each observation into a
//!    constrained local rotation and folds it into a per-bone ring buffer.
//! 2. [`PoseAccumulator::apply_learned_pose`] moves every bone from its last
//!    applied pose toward the buffered average and writes it to the skeleton.
//!
//! The last applied pose is explicit state. It is never reset or decayed; a
//! bone that stops receiving observations keeps its last pose until the caller
//! does something about it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::buffer::RingBuffer;
use crate::constraints::{ConstraintError, ConstraintProfile, ConstraintTable};
use crate::math::{
    align_rotation, angle_between_deg, average_positions, average_rotations, lerp, slerp, Quat,
    Vec3,
};
use crate::skeleton::{BoneId, Skeleton};

// =============================================================================
// Configuration
// =============================================================================

/// How the per-frame smoothing factor is derived.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum SmoothingCurve {
    /// `lerp(floor, class ceiling, delta / full_scale_deg)`: large target
    /// changes are followed quickly, small jitter is damped.
    Adaptive {
        #[serde(default = "default_floor")]
        floor: f64,
        #[serde(default = "default_full_scale_deg")]
        full_scale_deg: f64,
    },
    /// Plain exponential blend with a constant factor.
    Fixed { factor: f64 },
}

fn default_floor() -> f64 {
    0.3
}

fn default_full_scale_deg() -> f64 {
    90.0
}

impl Default for SmoothingCurve {
    fn default() -> Self {
        SmoothingCurve::Adaptive {
            floor: default_floor(),
            full_scale_deg: default_full_scale_deg(),
        }
    }
}

impl SmoothingCurve {
    /// Smoothing factor for an angular change of `delta_deg` on a bone whose
    /// class ceiling is `ceiling`.
    pub fn factor(&self, delta_deg: f64, ceiling: f64) -> f64 {
        match *self {
            SmoothingCurve::Adaptive {
                floor,
                full_scale_deg,
            } => {
                let t = (delta_deg / full_scale_deg).clamp(0.0, 1.0);
                floor + (ceiling - floor) * t
            }
            SmoothingCurve::Fixed { factor } => factor,
        }
    }
}

/// Pose accumulator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccumulatorConfig {
    /// Samples kept per bone.
    pub buffer_size: usize,
    /// Smoothing strategy.
    pub smoothing: SmoothingCurve,
    /// World up vector for the look-at construction.
    pub up: Vec3,
    /// Clamp observed rotations to the bone's swing/twist limits.
    pub constrain: bool,
    /// Directions shorter than this are discarded.
    pub min_direction_length: f64,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            buffer_size: 25,
            smoothing: SmoothingCurve::default(),
            up: Vec3::y(),
            constrain: true,
            min_direction_length: 1e-6,
        }
    }
}

impl AccumulatorConfig {
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_smoothing(mut self, smoothing: SmoothingCurve) -> Self {
        self.smoothing = smoothing;
        self
    }

    pub fn with_up(mut self, up: Vec3) -> Self {
        self.up = up;
        self
    }

    pub fn with_constrain(mut self, constrain: bool) -> Self {
        self.constrain = constrain;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), AccumulatorConfigError> {
        if self.buffer_size == 0 {
            return Err(AccumulatorConfigError::ZeroBufferSize);
        }
        match self.smoothing {
            SmoothingCurve::Adaptive {
                floor,
                full_scale_deg,
            } => {
                if !(0.0..=1.0).contains(&floor) {
                    return Err(AccumulatorConfigError::InvalidFactor(floor));
                }
                if !(full_scale_deg > 0.0 && full_scale_deg.is_finite()) {
                    return Err(AccumulatorConfigError::InvalidFullScale(full_scale_deg));
                }
            }
            SmoothingCurve::Fixed { factor } => {
                if !(0.0..=1.0).contains(&factor) {
                    return Err(AccumulatorConfigError::InvalidFactor(factor));
                }
            }
        }
        if !(self.up.norm() > 0.0) || !self.up.iter().all(|c| c.is_finite()) {
            return Err(AccumulatorConfigError::InvalidUp);
        }
        if !(self.min_direction_length >= 0.0 && self.min_direction_length.is_finite()) {
            return Err(AccumulatorConfigError::InvalidMinDirection(
                self.min_direction_length,
            ));
        }
        Ok(())
    }
}

/// Errors that can occur when building a [`PoseAccumulator`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AccumulatorConfigError {
    #[error("buffer_size must be at least 1")]
    ZeroBufferSize,
    #[error("smoothing factor must be between 0 and 1, got {0}")]
    InvalidFactor(f64),
    #[error("full_scale_deg must be positive, got {0}")]
    InvalidFullScale(f64),
    #[error("up vector must be finite and non-zero")]
    InvalidUp,
    #[error("min_direction_length must be a non-negative number, got {0}")]
    InvalidMinDirection(f64),
    #[error("invalid constraint profile: {0}")]
    Constraint(#[from] ConstraintError),
}

// =============================================================================
// Reports
// =============================================================================

/// Per-call summary of [`PoseAccumulator::add_training_sample`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleReport {
    /// Observations folded into a bone buffer.
    pub accepted: usize,
    /// Observations naming no bone of the skeleton.
    pub unknown: usize,
    /// Observations of root bones (no parent to aim from).
    pub roots: usize,
    /// Observations too close to the parent to define a direction.
    pub degenerate: usize,
}

impl SampleReport {
    /// Observations that did not reach a buffer.
    pub fn skipped(&self) -> usize {
        self.unknown + self.roots + self.degenerate
    }
}

// =============================================================================
// Pose Accumulator
// =============================================================================

#[derive(Debug, Clone)]
struct BoneState {
    rotations: RingBuffer<Quat>,
    positions: RingBuffer<Vec3>,
    target_rotation: Option<Quat>,
    target_position: Option<Vec3>,
    last_rotation: Option<Quat>,
    last_position: Option<Vec3>,
}

impl BoneState {
    fn new(capacity: usize) -> Self {
        Self {
            rotations: RingBuffer::new(capacity),
            positions: RingBuffer::new(capacity),
            target_rotation: None,
            target_position: None,
            last_rotation: None,
            last_position: None,
        }
    }
}

/// Constrained, buffered smoother for one skeleton.
///
/// The accumulator does not own the skeleton; it is handed in on every call
/// so several accumulators (one per avatar) never share state.
#[derive(Debug, Clone)]
pub struct PoseAccumulator {
    config: AccumulatorConfig,
    constraints: ConstraintTable,
    states: Vec<BoneState>,
}

impl PoseAccumulator {
    /// Builds an accumulator for `skeleton`, classifying every bone with
    /// `profile`.
    pub fn new(
        skeleton: &Skeleton,
        config: AccumulatorConfig,
        profile: &ConstraintProfile,
    ) -> Result<Self, AccumulatorConfigError> {
        config.validate()?;
        profile.validate()?;
        let states = (0..skeleton.len())
            .map(|_| BoneState::new(config.buffer_size))
            .collect();
        Ok(Self {
            constraints: ConstraintTable::build(skeleton, profile),
            config,
            states,
        })
    }

    /// Accumulator with default settings.
    pub fn with_defaults(skeleton: &Skeleton) -> Self {
        let config = AccumulatorConfig::default();
        let profile = ConstraintProfile::default();
        Self {
            constraints: ConstraintTable::build(skeleton, &profile),
            states: (0..skeleton.len())
                .map(|_| BoneState::new(config.buffer_size))
                .collect(),
            config,
        }
    }

    pub fn config(&self) -> &AccumulatorConfig {
        &self.config
    }

    pub fn constraints(&self) -> &ConstraintTable {
        &self.constraints
    }

    /// Picks up bones added to the skeleton after construction.
    fn sync(&mut self, skeleton: &Skeleton) {
        if skeleton.len() == self.states.len() {
            return;
        }
        let profile = self.constraints.profile().clone();
        self.constraints = ConstraintTable::build(skeleton, &profile);
        while self.states.len() < skeleton.len() {
            self.states.push(BoneState::new(self.config.buffer_size));
        }
    }

    /// Local rotation that aims `id` along the observed direction from its
    /// parent.
    fn observed_local_rotation(
        &self,
        skeleton: &Skeleton,
        id: BoneId,
        observed: &Vec3,
    ) -> Result<Quat, Skip> {
        let bone = skeleton.get(id).ok_or(Skip::Unknown)?;
        let parent = bone.parent().ok_or(Skip::Root)?;
        let (parent_position, parent_rotation) =
            skeleton.world_transform(parent).ok_or(Skip::Unknown)?;

        let direction = observed - parent_position;
        let length = direction.norm();
        if !(length > self.config.min_direction_length) || !length.is_finite() {
            return Err(Skip::Degenerate);
        }

        let rest_axis = bone.rest_position();
        let desired_world =
            align_rotation(&rest_axis, &direction, &self.config.up).ok_or(Skip::Degenerate)?;
        Ok(parent_rotation.inverse() * desired_world)
    }

    /// Folds one batch of world-space observations into the per-bone buffers.
    ///
    /// Observations are keyed by bone name. Unknown names, roots, and
    /// degenerate directions are counted in the report and otherwise ignored.
    pub fn add_training_sample<'a, I, K>(
        &mut self,
        skeleton: &Skeleton,
        observations: I,
    ) -> SampleReport
    where
        I: IntoIterator<Item = (K, &'a Vec3)>,
        K: AsRef<str>,
    {
        self.sync(skeleton);
        let mut report = SampleReport::default();

        for (name, observed) in observations {
            let name = name.as_ref();
            let Some(id) = skeleton.id(name) else {
                trace!(bone = name, "observation for unknown bone ignored");
                report.unknown += 1;
                continue;
            };

            let local = match self.observed_local_rotation(skeleton, id, observed) {
                Ok(local) => local,
                Err(Skip::Root) => {
                    report.roots += 1;
                    continue;
                }
                Err(Skip::Degenerate) => {
                    trace!(bone = name, "degenerate direction, observation discarded");
                    report.degenerate += 1;
                    continue;
                }
                Err(Skip::Unknown) => {
                    report.unknown += 1;
                    continue;
                }
            };

            let local = match (self.config.constrain, self.constraints.get(id)) {
                (true, Some(constraint)) => constraint.apply(&local),
                _ => local,
            };

            let state = &mut self.states[id.index()];
            state.rotations.push(local);
            state.target_rotation = Some(average_rotations(&state.rotations));
            state.positions.push(*observed);
            state.target_position = Some(average_positions(&state.positions));
            report.accepted += 1;
        }

        debug!(
            accepted = report.accepted,
            unknown = report.unknown,
            roots = report.roots,
            degenerate = report.degenerate,
            "training sample"
        );
        report
    }

    /// Moves every bone with a target toward it and writes the result to the
    /// skeleton. Returns the number of bones written.
    ///
    /// Bones are visited parent first, so each local position is derived from
    /// an already updated parent transform.
    pub fn apply_learned_pose(&mut self, skeleton: &mut Skeleton) -> usize {
        self.sync(skeleton);
        let ids: Vec<BoneId> = skeleton.iter().map(|(id, _)| id).collect();
        let mut written = 0;

        for id in ids {
            let ceiling = self.constraints.class_config(id).smoothing;
            let state = &mut self.states[id.index()];
            if state.target_rotation.is_none() && state.target_position.is_none() {
                continue;
            }

            let Some(bone) = skeleton.get(id) else {
                continue;
            };
            let parent = bone.parent();
            let current = state.last_rotation.unwrap_or_else(|| bone.local_rotation());
            let target = state.target_rotation.unwrap_or(current);
            let factor = self
                .config
                .smoothing
                .factor(angle_between_deg(&current, &target), ceiling);

            let rotation = slerp(&current, &target, factor);
            state.last_rotation = Some(rotation);

            let local_position = match (state.target_position, skeleton.world_position(id)) {
                (Some(target_position), Some(current_position)) => {
                    let smoothed = lerp(&current_position, &target_position, factor);
                    state.last_position = Some(smoothed);
                    parent
                        .and_then(|p| skeleton.world_transform(p))
                        .map(|(pp, pr)| pr.inverse() * (smoothed - pp))
                }
                _ => None,
            };

            if let Some(bone) = skeleton.get_mut(id) {
                bone.set_local_rotation(rotation);
                if let Some(local_position) = local_position {
                    bone.set_local_position(local_position);
                }
                written += 1;
            }
        }

        debug!(written, "applied learned pose");
        written
    }

    /// Anchors the smoother to a known pose: the unconstrained, unsmoothed
    /// local rotation of every observed bone becomes both its target and its
    /// last applied rotation. Buffers are left untouched. Returns the number of
    /// bones seeded.
    pub fn seed_pose<'a, I, K>(&mut self, skeleton: &Skeleton, world_positions: I) -> usize
    where
        I: IntoIterator<Item = (K, &'a Vec3)>,
        K: AsRef<str>,
    {
        self.sync(skeleton);
        let mut seeded = 0;
        for (name, observed) in world_positions {
            let Some(id) = skeleton.id(name.as_ref()) else {
                continue;
            };
            if let Ok(local) = self.observed_local_rotation(skeleton, id, observed) {
                let state = &mut self.states[id.index()];
                state.target_rotation = Some(local);
                state.last_rotation = Some(local);
                seeded += 1;
            }
        }
        seeded
    }

    /// Drops every buffer and all accumulated state.
    pub fn clear(&mut self) {
        for state in &mut self.states {
            *state = BoneState::new(self.config.buffer_size);
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Buffered local rotations of a bone, oldest first.
    pub fn rotation_samples(&self, id: BoneId) -> Option<&RingBuffer<Quat>> {
        self.states.get(id.index()).map(|s| &s.rotations)
    }

    /// Buffered world positions of a bone, oldest first.
    pub fn position_samples(&self, id: BoneId) -> Option<&RingBuffer<Vec3>> {
        self.states.get(id.index()).map(|s| &s.positions)
    }

    /// Current averaged target rotation.
    pub fn target_rotation(&self, id: BoneId) -> Option<Quat> {
        self.states.get(id.index()).and_then(|s| s.target_rotation)
    }

    /// Current averaged target world position.
    pub fn target_position(&self, id: BoneId) -> Option<Vec3> {
        self.states.get(id.index()).and_then(|s| s.target_position)
    }

    /// Rotation written by the last [`apply_learned_pose`](Self::apply_learned_pose).
    pub fn last_applied_rotation(&self, id: BoneId) -> Option<Quat> {
        self.states.get(id.index()).and_then(|s| s.last_rotation)
    }

    /// World position written by the last [`apply_learned_pose`](Self::apply_learned_pose).
    pub fn last_applied_position(&self, id: BoneId) -> Option<Vec3> {
        self.states.get(id.index()).and_then(|s| s.last_position)
    }

    /// Last applied rotations keyed by bone name.
    pub fn last_applied_rotations(&self, skeleton: &Skeleton) -> HashMap<String, Quat> {
        skeleton
            .iter()
            .filter_map(|(id, bone)| Some((bone.name().to_string(), self.last_applied_rotation(id)?)))
            .collect()
    }
}

enum Skip {
    Unknown,
    Root,
    Degenerate,
}
