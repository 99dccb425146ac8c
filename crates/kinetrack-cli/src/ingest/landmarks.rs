//! Decoded landmark records and their mapping onto rig bones.

use kinetrack_predict::JointId;
use kinetrack_rig::presets::{bone_name, FINGERS};
use kinetrack_rig::{Side, Vec3};
use serde::{Deserialize, Serialize};

/// Number of hand landmarks per hand.
pub const HAND_LANDMARKS: u32 = 21;

/// Pose landmark ids are shifted by this amount when used as joint ids, so
/// they never collide with hand landmark ids.
pub const POSE_JOINT_OFFSET: JointId = 100;

/// Landmark source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkKind {
    Hand,
    Pose,
}

/// One decoded landmark as produced by the upstream detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    #[serde(rename = "type")]
    pub kind: LandmarkKind,
    /// `Left` or `Right` for hand landmarks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hand_label: Option<String>,
    /// `Left`, `Right`, or absent for body-centre pose landmarks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<String>,
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Landmark {
    pub fn hand(side: Side, id: u32, position: Vec3) -> Self {
        Self {
            kind: LandmarkKind::Hand,
            hand_label: Some(label(side).to_string()),
            side: None,
            id,
            x: position.x,
            y: position.y,
            z: position.z,
        }
    }

    /// Pose landmark; `side` is `None` for body-centre landmarks.
    pub fn pose(side: Option<Side>, id: u32, position: Vec3) -> Self {
        Self {
            kind: LandmarkKind::Pose,
            hand_label: None,
            side: side.map(|s| label(s).to_string()),
            id,
            x: position.x,
            y: position.y,
            z: position.z,
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    /// Side from `hand_label` (hands) or `side` (pose).
    pub fn resolved_side(&self) -> Option<Side> {
        let raw = match self.kind {
            LandmarkKind::Hand => self.hand_label.as_deref(),
            LandmarkKind::Pose => self.side.as_deref(),
        };
        raw.and_then(parse_side)
    }

    /// Rig bone this landmark drives, if any.
    pub fn bone_name(&self) -> Option<String> {
        match self.kind {
            LandmarkKind::Hand => hand_bone(self.resolved_side()?, self.id),
            LandmarkKind::Pose => pose_bone(self.id),
        }
    }

    /// Joint id used by the predictive filter.
    pub fn joint_id(&self) -> JointId {
        match self.kind {
            LandmarkKind::Hand => self.id,
            LandmarkKind::Pose => POSE_JOINT_OFFSET + self.id,
        }
    }
}

fn label(side: Side) -> &'static str {
    match side {
        Side::Left => "Left",
        Side::Right => "Right",
    }
}

fn parse_side(raw: &str) -> Option<Side> {
    if raw.eq_ignore_ascii_case("left") {
        Some(Side::Left)
    } else if raw.eq_ignore_ascii_case("right") {
        Some(Side::Right)
    } else {
        None
    }
}

/// Hand landmark `id` (0..=20) to bone: 0 is the wrist, then four joints per
/// finger from base to tip.
pub fn hand_bone(side: Side, id: u32) -> Option<String> {
    if id == 0 {
        return Some(bone_name("hand", side));
    }
    if id >= HAND_LANDMARKS {
        return None;
    }
    let finger = FINGERS[((id - 1) / 4) as usize];
    let part = match (id - 1) % 4 {
        3 => format!("{}Tip", finger),
        segment => format!("{}{}", finger, segment + 1),
    };
    Some(bone_name(&part, side))
}

/// Pose landmark `id` to bone.
pub fn pose_bone(id: u32) -> Option<String> {
    let name = match id {
        0 => "B-head".to_string(),
        11 => bone_name("shoulder", Side::Left),
        12 => bone_name("shoulder", Side::Right),
        13 => bone_name("upperArm", Side::Left),
        14 => bone_name("upperArm", Side::Right),
        15 => bone_name("forearm", Side::Left),
        16 => bone_name("forearm", Side::Right),
        23 => "B-spine".to_string(),
        24 => "B-chest".to_string(),
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_hand_mapping() {
        assert_eq!(hand_bone(Side::Left, 0).as_deref(), Some("B-hand.L"));
        assert_eq!(hand_bone(Side::Right, 1).as_deref(), Some("B-thumb1.R"));
        assert_eq!(hand_bone(Side::Right, 4).as_deref(), Some("B-thumbTip.R"));
        assert_eq!(hand_bone(Side::Left, 8).as_deref(), Some("B-indexTip.L"));
        assert_eq!(hand_bone(Side::Left, 13).as_deref(), Some("B-ring1.L"));
        assert_eq!(hand_bone(Side::Right, 20).as_deref(), Some("B-pinkyTip.R"));
        assert_eq!(hand_bone(Side::Right, 21), None);
    }

    #[test]
    fn test_pose_mapping() {
        assert_eq!(pose_bone(0).as_deref(), Some("B-head"));
        assert_eq!(pose_bone(14).as_deref(), Some("B-upperArm.R"));
        assert_eq!(pose_bone(15).as_deref(), Some("B-forearm.L"));
        assert_eq!(pose_bone(24).as_deref(), Some("B-chest"));
        assert_eq!(pose_bone(5), None);
    }

    #[test]
    fn test_wire_format() {
        let json = r#"{"type":"hand","hand_label":"Left","id":8,"x":0.1,"y":0.2,"z":0.3}"#;
        let landmark: Landmark = serde_json::from_str(json).unwrap();
        assert_eq!(landmark.kind, LandmarkKind::Hand);
        assert_eq!(landmark.bone_name().as_deref(), Some("B-indexTip.L"));
        assert_eq!(landmark.joint_id(), 8);
        assert_eq!(landmark.position(), Vec3::new(0.1, 0.2, 0.3));
    }

    #[test]
    fn test_unlabelled_hand_has_no_bone() {
        let mut landmark = Landmark::hand(Side::Left, 3, Vec3::zeros());
        landmark.hand_label = Some("Unknown".into());
        assert_eq!(landmark.bone_name(), None);
    }

    #[test]
    fn test_pose_joint_ids_are_offset() {
        let landmark = Landmark::pose(None, 23, Vec3::zeros());
        assert_eq!(landmark.joint_id(), 123);
        assert_eq!(landmark.resolved_side(), None);
    }
}
