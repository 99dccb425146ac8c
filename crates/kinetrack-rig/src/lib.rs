//! Kinetrack rig library
//!
//! Skeleton, joint limits, and pose smoothing for driving an avatar from noisy
//! landmark observations.
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use kinetrack_rig::{presets, PoseAccumulator, Side, Vec3};
//!
//! let mut skeleton = presets::arm(Side::Right);
//! let mut accumulator = PoseAccumulator::with_defaults(&skeleton);
//!
//! let mut observed = BTreeMap::new();
//! observed.insert("B-forearm.R".to_string(), Vec3::new(-0.48, -0.2, 0.0));
//!
//! let report = accumulator.add_training_sample(&skeleton, &observed);
//! assert_eq!(report.accepted, 1);
//! accumulator.apply_learned_pose(&mut skeleton);
//! ```
//!
//! # Modules
//!
//! - [`math`]: vector and quaternion helpers
//! - [`buffer`]: bounded FIFO buffer
//! - [`skeleton`]: bone hierarchy and world pose derivation
//! - [`swing_twist`]: swing-twist decomposition and clamping
//! - [`constraints`]: bone classes and per-bone limits
//! - [`accumulator`]: buffered, constrained pose smoothing
//! - [`presets`]: ready-made arm, hand, and torso rigs
//! - [`dynamics`]: two-link arm model for synthetic motion

pub mod accumulator;
pub mod buffer;
pub mod constraints;
pub mod dynamics;
pub mod math;
pub mod presets;
pub mod skeleton;
pub mod swing_twist;

// Re-export commonly used types at the crate root
pub use accumulator::{
    AccumulatorConfig, AccumulatorConfigError, PoseAccumulator, SampleReport, SmoothingCurve,
};
pub use buffer::RingBuffer;
pub use constraints::{
    BoneClass, BoneClassConfig, BoneConstraint, ConstraintError, ConstraintProfile,
    ConstraintTable,
};
pub use dynamics::{ArmParameters, PdController, TwoLinkArm};
pub use math::{Quat, Vec3};
pub use presets::Side;
pub use skeleton::{Bone, BoneId, Skeleton};
pub use swing_twist::{clamp_swing_twist, SwingTwist};
