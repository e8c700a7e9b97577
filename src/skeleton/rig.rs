//! Debug visual rig
//!
//! Keeps one visual entry per (skeleton, joint) and per bone. Entries are
//! created the first time a joint is seen and updated in place afterwards;
//! they are never destroyed while the rig lives, only hidden. A renderer reads
//! [`SkeletonRig::joints`] and [`SkeletonRig::bones`] each frame.

use std::collections::HashMap;

use super::hierarchy::{Bone, JointHierarchy};
use super::snapshot::SkeletonSnapshot;
use super::types::{JointId, Quat, SkeletonId, SkeletonKind, Vec3};

/// Drawing options for one skeleton kind
#[derive(Debug, Clone, PartialEq)]
pub struct RigStyle {
    pub draw_joints: bool,
    /// Joint sphere diameter in meters
    pub joint_size: f32,
    pub joint_color: [u8; 3],
    pub draw_bones: bool,
    /// Bone line width in meters
    pub bone_width: f32,
    pub bone_color: [u8; 3],
}

impl RigStyle {
    pub fn hand() -> Self {
        Self {
            draw_joints: true,
            joint_size: 0.02,
            joint_color: [255, 0, 0],
            draw_bones: true,
            bone_width: 0.005,
            bone_color: [0, 0, 255],
        }
    }

    pub fn body() -> Self {
        Self {
            joint_color: [0, 255, 0],
            ..Self::hand()
        }
    }
}

/// Visual state of one joint
#[derive(Debug, Clone, PartialEq)]
pub struct JointVisual {
    pub position: Vec3,
    pub orientation: Quat,
    pub size: f32,
    pub color: [u8; 3],
    pub visible: bool,
}

/// Visual state of one bone
#[derive(Debug, Clone, PartialEq)]
pub struct BoneVisual {
    pub from: Vec3,
    pub to: Vec3,
    pub width: f32,
    pub color: [u8; 3],
    pub visible: bool,
}

/// Counters for rig churn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RigStats {
    pub joints_created: u64,
    pub bones_created: u64,
    pub updates: u64,
}

/// Keyed arena of joint and bone visuals
#[derive(Debug)]
pub struct SkeletonRig {
    hierarchy: JointHierarchy,
    hand_style: RigStyle,
    body_style: RigStyle,
    joints: HashMap<(SkeletonId, JointId), JointVisual>,
    bones: HashMap<(SkeletonId, Bone), BoneVisual>,
    /// Group visibility; false after tracking loss
    groups: HashMap<SkeletonId, bool>,
    stats: RigStats,
}

impl SkeletonRig {
    pub fn new(hand_style: RigStyle, body_style: RigStyle) -> Self {
        Self {
            hierarchy: JointHierarchy::new(),
            hand_style,
            body_style,
            joints: HashMap::new(),
            bones: HashMap::new(),
            groups: HashMap::new(),
            stats: RigStats::default(),
        }
    }

    fn style(&self, kind: SkeletonKind) -> &RigStyle {
        match kind {
            SkeletonKind::Hand => &self.hand_style,
            SkeletonKind::Body => &self.body_style,
        }
    }

    /// Mirror one snapshot into the rig
    ///
    /// `NotTracked` hides the whole skeleton group and leaves entries in place.
    /// Joints absent from a tracked snapshot are hidden for this tick.
    pub fn apply(&mut self, snapshot: &SkeletonSnapshot) {
        let skeleton = snapshot.skeleton();

        let joints = match snapshot {
            SkeletonSnapshot::NotTracked { .. } => {
                if self.groups.insert(skeleton, false) != Some(false) {
                    tracing::debug!(skeleton = %skeleton, "Hiding rig group");
                }
                return;
            }
            SkeletonSnapshot::Tracked { joints, .. } => joints,
        };

        self.groups.insert(skeleton, true);
        self.stats.updates += 1;
        let style = self.style(skeleton.kind()).clone();

        for visual in self
            .joints
            .iter_mut()
            .filter(|((s, _), _)| *s == skeleton)
            .map(|(_, v)| v)
        {
            visual.visible = false;
        }
        for visual in self
            .bones
            .iter_mut()
            .filter(|((s, _), _)| *s == skeleton)
            .map(|(_, v)| v)
        {
            visual.visible = false;
        }

        if style.draw_joints {
            for sample in joints {
                let orientation = sample.orientation.unwrap_or(Quat::IDENTITY);
                match self.joints.get_mut(&(skeleton, sample.joint)) {
                    Some(visual) => {
                        visual.position = sample.position;
                        visual.orientation = orientation;
                        visual.visible = true;
                    }
                    None => {
                        self.stats.joints_created += 1;
                        self.joints.insert(
                            (skeleton, sample.joint),
                            JointVisual {
                                position: sample.position,
                                orientation,
                                size: style.joint_size,
                                color: style.joint_color,
                                visible: true,
                            },
                        );
                    }
                }
            }
        }

        if style.draw_bones {
            let ids: Vec<JointId> = joints.iter().map(|s| s.joint).collect();
            for bone in self.hierarchy.bones_within(&ids) {
                let (Some(from), Some(to)) = (snapshot.get(bone.parent), snapshot.get(bone.child))
                else {
                    continue;
                };
                match self.bones.get_mut(&(skeleton, bone)) {
                    Some(visual) => {
                        visual.from = from.position;
                        visual.to = to.position;
                        visual.visible = true;
                    }
                    None => {
                        self.stats.bones_created += 1;
                        self.bones.insert(
                            (skeleton, bone),
                            BoneVisual {
                                from: from.position,
                                to: to.position,
                                width: style.bone_width,
                                color: style.bone_color,
                                visible: true,
                            },
                        );
                    }
                }
            }
        }
    }

    /// Whether a skeleton group is currently shown
    pub fn is_visible(&self, skeleton: SkeletonId) -> bool {
        self.groups.get(&skeleton).copied().unwrap_or(false)
    }

    pub fn joint(&self, skeleton: SkeletonId, joint: JointId) -> Option<&JointVisual> {
        self.joints.get(&(skeleton, joint))
    }

    /// Visible joints of a skeleton; empty while the group is hidden
    pub fn joints(&self, skeleton: SkeletonId) -> impl Iterator<Item = (JointId, &JointVisual)> {
        let shown = self.is_visible(skeleton);
        self.joints
            .iter()
            .filter(move |((s, _), v)| shown && *s == skeleton && v.visible)
            .map(|((_, j), v)| (*j, v))
    }

    /// Visible bones of a skeleton; empty while the group is hidden
    pub fn bones(&self, skeleton: SkeletonId) -> impl Iterator<Item = (Bone, &BoneVisual)> {
        let shown = self.is_visible(skeleton);
        self.bones
            .iter()
            .filter(move |((s, _), v)| shown && *s == skeleton && v.visible)
            .map(|((_, b), v)| (*b, v))
    }

    pub fn stats(&self) -> RigStats {
        self.stats
    }
}

impl Default for SkeletonRig {
    fn default() -> Self {
        Self::new(RigStyle::hand(), RigStyle::body())
    }
}
