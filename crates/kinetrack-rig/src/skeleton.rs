//! Parent-relative bone hierarchy.
//!
//! A [`Skeleton`] owns every [`Bone`] in an arena; parents are referenced by
//! [`BoneId`] and are always inserted before their children, so the parent
//! graph is acyclic by construction. World transforms are derived on demand by
//! walking to the root and are never cached.

use std::collections::{BTreeMap, HashMap};

use tracing::{trace, warn};

use crate::math::{Quat, Vec3};

// =============================================================================
// Bone
// =============================================================================

/// Index of a bone inside its skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoneId(usize);

impl BoneId {
    /// Position of the bone in insertion order.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A named joint with a rest offset from its parent and a mutable local pose.
#[derive(Debug, Clone, PartialEq)]
pub struct Bone {
    name: String,
    parent: Option<BoneId>,
    rest_position: Vec3,
    local_position: Vec3,
    local_rotation: Quat,
}

impl Bone {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent bone, `None` for roots.
    pub fn parent(&self) -> Option<BoneId> {
        self.parent
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Offset from the parent given at construction.
    pub fn rest_position(&self) -> Vec3 {
        self.rest_position
    }

    pub fn local_position(&self) -> Vec3 {
        self.local_position
    }

    pub fn local_rotation(&self) -> Quat {
        self.local_rotation
    }

    pub fn set_local_position(&mut self, position: Vec3) {
        self.local_position = position;
    }

    pub fn set_local_rotation(&mut self, rotation: Quat) {
        self.local_rotation = rotation;
    }

    /// Left-multiplies `delta` onto the local rotation.
    pub fn apply_rotation(&mut self, delta: Quat) {
        self.local_rotation = delta * self.local_rotation;
    }
}

// =============================================================================
// Skeleton
// =============================================================================

/// Named bone tree (a forest in general).
#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    bones: Vec<Bone>,
    by_name: HashMap<String, BoneId>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a bone with the given rest offset from its parent.
    ///
    /// Callers must add parents before children. An unknown `parent` name is
    /// not an error: the bone becomes a root. Re-adding an existing name is
    /// ignored and returns the existing id.
    pub fn add_bone(
        &mut self,
        name: impl Into<String>,
        parent: Option<&str>,
        local_offset: Vec3,
    ) -> BoneId {
        let name = name.into();
        if let Some(&existing) = self.by_name.get(&name) {
            warn!(bone = %name, "bone already exists, ignoring add_bone");
            return existing;
        }

        let parent_id = parent.and_then(|parent_name| {
            let id = self.by_name.get(parent_name).copied();
            if id.is_none() {
                trace!(bone = %name, parent = parent_name, "unknown parent, adding as root");
            }
            id
        });

        let id = BoneId(self.bones.len());
        self.bones.push(Bone {
            name: name.clone(),
            parent: parent_id,
            rest_position: local_offset,
            local_position: local_offset,
            local_rotation: Quat::identity(),
        });
        self.by_name.insert(name, id);
        id
    }

    /// Adds a bone from its rest-pose world position, deriving the local offset
    /// from the parent's rest-pose world position.
    pub fn add_bone_at(
        &mut self,
        name: impl Into<String>,
        parent: Option<&str>,
        rest_world_position: Vec3,
    ) -> BoneId {
        let parent_rest = parent
            .and_then(|p| self.id(p))
            .and_then(|id| self.rest_world_position(id))
            .unwrap_or_else(Vec3::zeros);
        self.add_bone(name, parent, rest_world_position - parent_rest)
    }

    pub fn id(&self, name: &str) -> Option<BoneId> {
        self.by_name.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn get(&self, id: BoneId) -> Option<&Bone> {
        self.bones.get(id.0)
    }

    pub fn get_mut(&mut self, id: BoneId) -> Option<&mut Bone> {
        self.bones.get_mut(id.0)
    }

    pub fn bone(&self, name: &str) -> Option<&Bone> {
        self.id(name).and_then(|id| self.get(id))
    }

    pub fn bone_mut(&mut self, name: &str) -> Option<&mut Bone> {
        let id = self.id(name)?;
        self.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    /// Bones in insertion order, so every parent precedes its children.
    pub fn iter(&self) -> impl Iterator<Item = (BoneId, &Bone)> {
        self.bones.iter().enumerate().map(|(i, b)| (BoneId(i), b))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bones.iter().map(|b| b.name.as_str())
    }

    /// Sets a bone's local rotation. Returns false for unknown names.
    pub fn set_local_rotation(&mut self, name: &str, rotation: Quat) -> bool {
        match self.bone_mut(name) {
            Some(bone) => {
                bone.set_local_rotation(rotation);
                true
            }
            None => false,
        }
    }

    /// Sets a bone's local position. Returns false for unknown names.
    pub fn set_local_position(&mut self, name: &str, position: Vec3) -> bool {
        match self.bone_mut(name) {
            Some(bone) => {
                bone.set_local_position(position);
                true
            }
            None => false,
        }
    }

    // -------------------------------------------------------------------------
    // World pose
    // -------------------------------------------------------------------------

    /// World position and rotation of a bone, folded from the root down.
    pub fn world_transform(&self, id: BoneId) -> Option<(Vec3, Quat)> {
        let mut chain = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let bone = self.get(current)?;
            chain.push(bone);
            cursor = bone.parent;
        }

        let mut position = Vec3::zeros();
        let mut rotation = Quat::identity();
        for bone in chain.iter().rev() {
            position += rotation * bone.local_position;
            rotation *= bone.local_rotation;
        }
        Some((position, rotation))
    }

    pub fn world_position(&self, id: BoneId) -> Option<Vec3> {
        self.world_transform(id).map(|(p, _)| p)
    }

    pub fn world_rotation(&self, id: BoneId) -> Option<Quat> {
        self.world_transform(id).map(|(_, r)| r)
    }

    /// World position of a bone when every rotation is at identity and every
    /// local position is at rest.
    pub fn rest_world_position(&self, id: BoneId) -> Option<Vec3> {
        let mut position = Vec3::zeros();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let bone = self.get(current)?;
            position += bone.rest_position;
            cursor = bone.parent;
        }
        Some(position)
    }

    /// Snapshot of every bone's world position.
    pub fn world_positions(&self) -> BTreeMap<String, Vec3> {
        self.iter()
            .filter_map(|(id, bone)| Some((bone.name.clone(), self.world_position(id)?)))
            .collect()
    }

    /// Snapshot of every bone's world rotation.
    pub fn world_rotations(&self) -> BTreeMap<String, Quat> {
        self.iter()
            .filter_map(|(id, bone)| Some((bone.name.clone(), self.world_rotation(id)?)))
            .collect()
    }
}
