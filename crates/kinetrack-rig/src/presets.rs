//! Ready-made rigs using the `B-<part>[.L|.R]` naming scheme.
//!
//! Offsets are in meters for an adult-sized avatar in a T-pose: +X points to
//! the avatar's left, +Y up, +Z forward.

use serde::{Deserialize, Serialize};

use crate::math::Vec3;
use crate::skeleton::Skeleton;

/// Body side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Bone name suffix (`L` or `R`).
    pub fn suffix(&self) -> &'static str {
        match self {
            Side::Left => "L",
            Side::Right => "R",
        }
    }

    /// +1 for left, -1 for right; mirrors X offsets.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Left => 1.0,
            Side::Right => -1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

/// Full bone name for a sided part, e.g. `B-forearm.R`.
pub fn bone_name(part: &str, side: Side) -> String {
    format!("B-{}.{}", part, side.suffix())
}

/// Finger names in landmark order.
pub const FINGERS: [&str; 5] = ["thumb", "index", "middle", "ring", "pinky"];

/// Shoulder → upperArm → forearm → hand.
pub fn arm(side: Side) -> Skeleton {
    let mut skeleton = Skeleton::new();
    add_arm(&mut skeleton, side, None);
    skeleton
}

/// Adds an arm chain under `parent` (or as a root).
pub fn add_arm(skeleton: &mut Skeleton, side: Side, parent: Option<&str>) {
    let s = side.sign();
    let shoulder = bone_name("shoulder", side);
    let upper = bone_name("upperArm", side);
    let forearm = bone_name("forearm", side);
    skeleton.add_bone(&shoulder, parent, Vec3::new(0.18 * s, 0.0, 0.0));
    skeleton.add_bone(&upper, Some(shoulder.as_str()), Vec3::new(0.3 * s, 0.0, 0.0));
    skeleton.add_bone(&forearm, Some(upper.as_str()), Vec3::new(0.25 * s, 0.0, 0.0));
    skeleton.add_bone(
        bone_name("hand", side),
        Some(forearm.as_str()),
        Vec3::new(0.2 * s, 0.0, 0.0),
    );
}

/// Hand root plus five fingers of three segments and a tip each.
pub fn hand(side: Side) -> Skeleton {
    let mut skeleton = Skeleton::new();
    let root = bone_name("hand", side);
    skeleton.add_bone(&root, None, Vec3::zeros());
    add_fingers(&mut skeleton, side, &root);
    skeleton
}

/// Adds the five finger chains under `hand`.
pub fn add_fingers(skeleton: &mut Skeleton, side: Side, hand: &str) {
    let s = side.sign();
    // Knuckle spread across the palm, thumb towards the body front.
    let bases = [
        Vec3::new(0.025 * s, -0.01, 0.03),
        Vec3::new(0.09 * s, 0.0, 0.025),
        Vec3::new(0.095 * s, 0.0, 0.005),
        Vec3::new(0.09 * s, 0.0, -0.015),
        Vec3::new(0.08 * s, 0.0, -0.035),
    ];
    let segment_lengths = [
        [0.032, 0.028, 0.022],
        [0.025, 0.022, 0.018],
        [0.028, 0.024, 0.019],
        [0.026, 0.022, 0.018],
        [0.02, 0.018, 0.016],
    ];

    for ((finger, base), lengths) in FINGERS.iter().zip(bases).zip(segment_lengths) {
        let direction = if *finger == "thumb" {
            Vec3::new(0.7 * s, 0.0, 0.7).normalize()
        } else {
            Vec3::new(s, 0.0, 0.0)
        };
        let mut parent = hand.to_string();
        for segment in 0..4 {
            let part = if segment == 3 {
                format!("{}Tip", finger)
            } else {
                format!("{}{}", finger, segment + 1)
            };
            let offset = if segment == 0 {
                base
            } else {
                direction * lengths[segment - 1]
            };
            let name = bone_name(&part, side);
            skeleton.add_bone(&name, Some(parent.as_str()), offset);
            parent = name;
        }
    }
}

/// Spine → chest → neck → head.
pub fn torso() -> Skeleton {
    let mut skeleton = Skeleton::new();
    skeleton.add_bone("B-spine", None, Vec3::new(0.0, 1.0, 0.0));
    skeleton.add_bone("B-chest", Some("B-spine"), Vec3::new(0.0, 0.25, 0.0));
    skeleton.add_bone("B-neck", Some("B-chest"), Vec3::new(0.0, 0.22, 0.0));
    skeleton.add_bone("B-head", Some("B-neck"), Vec3::new(0.0, 0.12, 0.0));
    skeleton
}
