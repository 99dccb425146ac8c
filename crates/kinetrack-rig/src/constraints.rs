//! Per-bone joint limits grouped by bone class.
//!
//! Each bone is classified once, by name, into a [`BoneClass`]. The class
//! decides the smoothing ceiling, the swing cap, and the twist range. The twist
//! axis comes from the bone's rest offset.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::math::{Quat, Vec3, DIRECTION_EPSILON};
use crate::skeleton::{BoneId, Skeleton};
use crate::swing_twist::clamp_swing_twist;

// =============================================================================
// Bone Classes
// =============================================================================

/// Coarse anatomical class of a bone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoneClass {
    /// Hand-level joints: wider limits, stronger follow.
    Root,
    /// Finger-level joints: tight limits, more damping.
    #[default]
    Distal,
}

impl BoneClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoneClass::Root => "root",
            BoneClass::Distal => "distal",
        }
    }
}

/// Smoothing and limits shared by every bone of a class. Angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoneClassConfig {
    /// Ceiling of the adaptive smoothing factor (0.0-1.0).
    pub smoothing: f64,
    /// Maximum swing away from the rest axis.
    pub max_swing: f64,
    /// Minimum twist around the rest axis.
    pub min_twist: f64,
    /// Maximum twist around the rest axis.
    pub max_twist: f64,
}

impl BoneClassConfig {
    /// Hand-level defaults.
    pub fn root() -> Self {
        Self {
            smoothing: 0.85,
            max_swing: 45.0,
            min_twist: -90.0,
            max_twist: 90.0,
        }
    }

    /// Finger-level defaults.
    pub fn distal() -> Self {
        Self {
            smoothing: 0.65,
            max_swing: 25.0,
            min_twist: -15.0,
            max_twist: 15.0,
        }
    }

    /// Validates the class configuration.
    pub fn validate(&self) -> Result<(), ConstraintError> {
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(ConstraintError::InvalidSmoothing(self.smoothing));
        }
        if !(0.0..=180.0).contains(&self.max_swing) {
            return Err(ConstraintError::InvalidSwingCap(self.max_swing));
        }
        if self.min_twist > self.max_twist
            || self.min_twist < -180.0
            || self.max_twist > 180.0
        {
            return Err(ConstraintError::InvalidTwistRange {
                min: self.min_twist,
                max: self.max_twist,
            });
        }
        Ok(())
    }
}

// =============================================================================
// Constraint Profile
// =============================================================================

/// Class limits plus the name keywords used to classify bones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConstraintProfile {
    /// Limits for [`BoneClass::Root`] bones.
    pub root: BoneClassConfig,
    /// Limits for [`BoneClass::Distal`] bones.
    pub distal: BoneClassConfig,
    /// Case-insensitive substrings that mark a root bone. Checked first.
    pub root_keywords: Vec<String>,
    /// Case-insensitive substrings that mark a distal bone.
    pub distal_keywords: Vec<String>,
    /// Class for names matching no keyword.
    pub fallback: BoneClass,
}

impl Default for ConstraintProfile {
    fn default() -> Self {
        Self {
            root: BoneClassConfig::root(),
            distal: BoneClassConfig::distal(),
            root_keywords: vec!["hand".into()],
            distal_keywords: ["thumb", "index", "middle", "ring", "pinky"]
                .into_iter()
                .map(String::from)
                .collect(),
            fallback: BoneClass::Distal,
        }
    }
}

impl ConstraintProfile {
    /// Sets the root class limits.
    pub fn with_root(mut self, config: BoneClassConfig) -> Self {
        self.root = config;
        self
    }

    /// Sets the distal class limits.
    pub fn with_distal(mut self, config: BoneClassConfig) -> Self {
        self.distal = config;
        self
    }

    /// Sets the fallback class.
    pub fn with_fallback(mut self, class: BoneClass) -> Self {
        self.fallback = class;
        self
    }

    /// Limits for a class.
    pub fn class_config(&self, class: BoneClass) -> &BoneClassConfig {
        match class {
            BoneClass::Root => &self.root,
            BoneClass::Distal => &self.distal,
        }
    }

    /// Classifies a bone name by case-insensitive keyword match.
    pub fn classify(&self, bone_name: &str) -> BoneClass {
        let lower = bone_name.to_lowercase();
        let matches = |keywords: &[String]| {
            keywords
                .iter()
                .any(|k| !k.is_empty() && lower.contains(&k.to_lowercase()))
        };
        if matches(&self.root_keywords) {
            BoneClass::Root
        } else if matches(&self.distal_keywords) {
            BoneClass::Distal
        } else {
            self.fallback
        }
    }

    /// Validates both classes and the keyword lists.
    pub fn validate(&self) -> Result<(), ConstraintError> {
        self.root.validate()?;
        self.distal.validate()?;
        if self
            .root_keywords
            .iter()
            .chain(&self.distal_keywords)
            .any(|k| k.trim().is_empty())
        {
            return Err(ConstraintError::EmptyKeyword);
        }
        Ok(())
    }
}

/// Errors that can occur when validating constraint settings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConstraintError {
    /// Twist range is inverted or outside [-180, 180].
    #[error("invalid twist range: min ({min}) must not exceed max ({max}) and both must lie in [-180, 180]")]
    InvalidTwistRange { min: f64, max: f64 },
    /// Swing cap outside [0, 180].
    #[error("swing cap must be between 0 and 180 degrees, got {0}")]
    InvalidSwingCap(f64),
    /// Smoothing outside [0, 1].
    #[error("smoothing must be between 0 and 1, got {0}")]
    InvalidSmoothing(f64),
    /// A classification keyword is blank.
    #[error("classification keywords cannot be empty")]
    EmptyKeyword,
}

// =============================================================================
// Bone Constraint
// =============================================================================

/// Limits for one bone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneConstraint {
    /// Class the bone was assigned to.
    pub class: BoneClass,
    /// Unit twist axis in the bone's local frame.
    pub twist_axis: Vec3,
    /// Minimum twist in degrees.
    pub min_twist: f64,
    /// Maximum twist in degrees.
    pub max_twist: f64,
    /// Maximum swing in degrees.
    pub max_swing: f64,
}

impl BoneConstraint {
    /// Builds a constraint from a class config and a rest offset. Roots and
    /// zero offsets get the +Z axis.
    pub fn new(class: BoneClass, config: &BoneClassConfig, rest_offset: Option<Vec3>) -> Self {
        let twist_axis = rest_offset
            .filter(|offset| offset.norm() > DIRECTION_EPSILON)
            .map(|offset| offset.normalize())
            .unwrap_or_else(Vec3::z);
        Self {
            class,
            twist_axis,
            min_twist: config.min_twist,
            max_twist: config.max_twist,
            max_swing: config.max_swing,
        }
    }

    /// Clamps a local rotation to this bone's swing and twist limits.
    pub fn apply(&self, rotation: &Quat) -> Quat {
        clamp_swing_twist(
            rotation,
            &self.twist_axis,
            self.min_twist.to_radians(),
            self.max_twist.to_radians(),
            self.max_swing.to_radians(),
        )
    }
}

// =============================================================================
// Constraint Table
// =============================================================================

/// One [`BoneConstraint`] for every bone of a skeleton, indexed by [`BoneId`].
#[derive(Debug, Clone)]
pub struct ConstraintTable {
    profile: ConstraintProfile,
    entries: Vec<BoneConstraint>,
}

impl ConstraintTable {
    /// Classifies every bone and derives its twist axis from the rest offset.
    pub fn build(skeleton: &Skeleton, profile: &ConstraintProfile) -> Self {
        let entries = skeleton
            .iter()
            .map(|(_, bone)| {
                let class = profile.classify(bone.name());
                let rest_offset = (!bone.is_root()).then(|| bone.rest_position());
                BoneConstraint::new(class, profile.class_config(class), rest_offset)
            })
            .collect();
        Self {
            profile: profile.clone(),
            entries,
        }
    }

    pub fn get(&self, id: BoneId) -> Option<&BoneConstraint> {
        self.entries.get(id.index())
    }

    /// Class limits for a bone, falling back to the profile's fallback class.
    pub fn class_config(&self, id: BoneId) -> &BoneClassConfig {
        let class = self
            .get(id)
            .map(|c| c.class)
            .unwrap_or(self.profile.fallback);
        self.profile.class_config(class)
    }

    pub fn profile(&self) -> &ConstraintProfile {
        &self.profile
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::axis_angle_deg;
    use crate::swing_twist::SwingTwist;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_classify_by_keyword() {
        let profile = ConstraintProfile::default();
        assert_eq!(profile.classify("B-hand.R"), BoneClass::Root);
        assert_eq!(profile.classify("B-HAND.L"), BoneClass::Root);
        assert_eq!(profile.classify("B-index2.L"), BoneClass::Distal);
        assert_eq!(profile.classify("B-forearm.R"), BoneClass::Distal);
        assert_eq!(
            profile
                .clone()
                .with_fallback(BoneClass::Root)
                .classify("B-forearm.R"),
            BoneClass::Root
        );
    }

    #[test]
    fn test_table_covers_every_bone() {
        let mut skeleton = Skeleton::new();
        skeleton.add_bone("B-hand.R", None, Vec3::new(0.0, 1.0, 0.0));
        skeleton.add_bone("B-index1.R", Some("B-hand.R"), Vec3::new(0.0, 0.0, 0.08));
        skeleton.add_bone("B-index2.R", Some("B-index1.R"), Vec3::zeros());

        let table = ConstraintTable::build(&skeleton, &ConstraintProfile::default());
        assert_eq!(table.len(), skeleton.len());

        let hand = table.get(skeleton.id("B-hand.R").unwrap()).unwrap();
        assert_eq!(hand.class, BoneClass::Root);
        assert_eq!(hand.twist_axis, Vec3::z());
        assert_eq!(hand.max_swing, 45.0);

        let index1 = table.get(skeleton.id("B-index1.R").unwrap()).unwrap();
        assert_eq!(index1.class, BoneClass::Distal);
        assert!((index1.twist_axis - Vec3::z()).norm() < 1e-12);
        assert_eq!((index1.min_twist, index1.max_twist), (-15.0, 15.0));

        // Zero-length offsets fall back to +Z.
        let index2 = table.get(skeleton.id("B-index2.R").unwrap()).unwrap();
        assert_eq!(index2.twist_axis, Vec3::z());
    }

    #[test]
    fn test_constraint_apply_clamps_swing() {
        let constraint =
            BoneConstraint::new(BoneClass::Distal, &BoneClassConfig::distal(), Some(Vec3::x()));
        let q = axis_angle_deg(&Vec3::z(), 70.0);
        let clamped = constraint.apply(&q);
        let parts = SwingTwist::decompose(&clamped, &Vec3::x());
        assert!((parts.swing_angle().to_degrees() - 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = BoneClassConfig::distal();
        config.smoothing = 1.5;
        assert_eq!(config.validate(), Err(ConstraintError::InvalidSmoothing(1.5)));

        let mut config = BoneClassConfig::root();
        config.max_swing = -1.0;
        assert_eq!(config.validate(), Err(ConstraintError::InvalidSwingCap(-1.0)));

        let mut config = BoneClassConfig::root();
        config.min_twist = 10.0;
        config.max_twist = 0.0;
        assert_eq!(
            config.validate(),
            Err(ConstraintError::InvalidTwistRange { min: 10.0, max: 0.0 })
        );

        let mut profile = ConstraintProfile::default();
        profile.distal_keywords.push(" ".into());
        assert_eq!(profile.validate(), Err(ConstraintError::EmptyKeyword));
        assert!(ConstraintProfile::default().validate().is_ok());
    }

    #[test]
    fn test_profile_serde_defaults() {
        let json = r#"{"distal":{"smoothing":0.5,"max_swing":30.0,"min_twist":-10.0,"max_twist":10.0}}"#;
        let profile: ConstraintProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.root, BoneClassConfig::root());
        assert_eq!(profile.distal.max_swing, 30.0);
        assert_eq!(profile.root_keywords, vec!["hand".to_string()]);
        assert_eq!(profile.fallback, BoneClass::Distal);
    }
}
