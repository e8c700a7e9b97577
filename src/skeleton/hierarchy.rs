//! Joint hierarchy
//!
//! Hand-written parent table for hand and body skeletons. Each skeleton kind
//! is a tree with a single root (the wrist for hands, the root joint for the
//! body). Lookups never fail: a joint without a parent simply reports `None`,
//! so callers draw no bone instead of erroring.
//!
//! ```text
//! Hand:  Wrist ─┬─ Thumb0 ── Thumb1 ── ThumbTip
//!               ├─ Index1 ── IndexTip
//!               ├─ Middle1 ── MiddleTip
//!               ├─ Ring1 ── RingTip
//!               └─ Pinky1 ── PinkyTip
//!
//! Body:  ROOT ── HIPS ─┬─ SPINE_LOWER ── SPINE_MIDDLE ── SPINE_UPPER ── CHEST ─┬─ NECK ── HEAD
//!                      │                                                      ├─ LEFT_SHOULDER ── ARM_UPPER ── ARM_LOWER ── HAND_WRIST
//!                      │                                                      └─ RIGHT_SHOULDER ── ...
//!                      ├─ LEFT_LEG_UPPER ── LEFT_KNEE ── LEFT_FOOT
//!                      └─ RIGHT_LEG_UPPER ── RIGHT_KNEE ── RIGHT_FOOT
//! ```

use super::types::{BodyJoint, HandJoint, JointId, SkeletonKind};

/// A bone segment between a joint and its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bone {
    pub parent: JointId,
    pub child: JointId,
}

/// Static parent lookup for every supported skeleton
#[derive(Debug, Clone, Copy, Default)]
pub struct JointHierarchy;

impl JointHierarchy {
    pub fn new() -> Self {
        Self
    }

    /// Parent of a joint, or `None` for roots
    pub fn parent_of(&self, joint: JointId) -> Option<JointId> {
        match joint {
            JointId::Hand(j) => hand_parent(j).map(JointId::Hand),
            JointId::Body(j) => body_parent(j).map(JointId::Body),
        }
    }

    /// Root joint of a skeleton kind
    pub fn root_of(&self, kind: SkeletonKind) -> JointId {
        match kind {
            SkeletonKind::Hand => JointId::Hand(HandJoint::Wrist),
            SkeletonKind::Body => JointId::Body(BodyJoint::Root),
        }
    }

    /// Walk from a joint up to its root, inclusive on both ends
    pub fn chain_to_root(&self, joint: JointId) -> Vec<JointId> {
        let mut chain = vec![joint];
        let mut current = joint;
        while let Some(parent) = self.parent_of(current) {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Every joint of a skeleton kind, root first
    pub fn joints(&self, kind: SkeletonKind) -> Vec<JointId> {
        JointId::all(kind)
    }

    /// Every bone of a skeleton kind, child-ordered
    pub fn bones(&self, kind: SkeletonKind) -> Vec<Bone> {
        JointId::all(kind)
            .into_iter()
            .filter_map(|child| self.parent_of(child).map(|parent| Bone { parent, child }))
            .collect()
    }

    /// Bones whose endpoints are both in `joints`
    ///
    /// A joint whose parent is missing from the set contributes no bone.
    pub fn bones_within(&self, joints: &[JointId]) -> Vec<Bone> {
        joints
            .iter()
            .filter_map(|&child| {
                self.parent_of(child)
                    .filter(|parent| joints.contains(parent))
                    .map(|parent| Bone { parent, child })
            })
            .collect()
    }
}

fn hand_parent(joint: HandJoint) -> Option<HandJoint> {
    use HandJoint::*;
    match joint {
        Wrist => None,
        ThumbMetacarpal | IndexProximal | MiddleProximal | RingProximal | LittleProximal => {
            Some(Wrist)
        }
        ThumbProximal => Some(ThumbMetacarpal),
        ThumbTip => Some(ThumbProximal),
        IndexTip => Some(IndexProximal),
        MiddleTip => Some(MiddleProximal),
        RingTip => Some(RingProximal),
        LittleTip => Some(LittleProximal),
    }
}

fn body_parent(joint: BodyJoint) -> Option<BodyJoint> {
    use BodyJoint::*;
    match joint {
        Root => None,
        Hips => Some(Root),
        SpineLower => Some(Hips),
        SpineMiddle => Some(SpineLower),
        SpineUpper => Some(SpineMiddle),
        Chest => Some(SpineUpper),
        Neck => Some(Chest),
        Head => Some(Neck),
        LeftShoulder | RightShoulder => Some(Chest),
        LeftArmUpper => Some(LeftShoulder),
        LeftArmLower => Some(LeftArmUpper),
        LeftHandWrist => Some(LeftArmLower),
        RightArmUpper => Some(RightShoulder),
        RightArmLower => Some(RightArmUpper),
        RightHandWrist => Some(RightArmLower),
        LeftLegUpper | RightLegUpper => Some(Hips),
        LeftKnee => Some(LeftLegUpper),
        LeftFoot => Some(LeftKnee),
        RightKnee => Some(RightLegUpper),
        RightFoot => Some(RightKnee),
    }
}
