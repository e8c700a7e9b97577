//! Core skeleton types
//!
//! Strongly-typed joint identifiers, skeleton owners, and the small amount of
//! vector math the pipeline needs. Joint ids are independent of any tracking
//! SDK's numbering; adapters map their bone ids onto these variants.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 3D position in tracking space (meters)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Distance to another position
    pub fn distance(&self, other: &Vec3) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl std::ops::Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// Orientation as a unit quaternion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    pub const IDENTITY: Self = Self { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Rotation of `angle` radians around the Y axis
    pub fn from_yaw(angle: f32) -> Self {
        let half = angle * 0.5;
        Self::new(0.0, half.sin(), 0.0, half.cos())
    }

    /// Returns the quaternion scaled to unit length, or identity for a zero quaternion
    pub fn normalized(&self) -> Self {
        let len = (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt();
        if len <= f32::EPSILON {
            return Self::IDENTITY;
        }
        Self::new(self.x / len, self.y / len, self.z / len, self.w / len)
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A joint pose as reported by a tracking source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Option<Quat>,
}

impl Pose {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            orientation: None,
        }
    }

    pub fn with_orientation(mut self, orientation: Quat) -> Self {
        self.orientation = Some(orientation.normalized());
        self
    }
}

// MARK: - Skeleton owners

/// Which hand a hand skeleton belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handedness {
    Left,
    Right,
}

/// Identifies one skeleton instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkeletonId {
    Hand(Handedness),
    Body,
}

impl SkeletonId {
    pub const LEFT_HAND: Self = SkeletonId::Hand(Handedness::Left);
    pub const RIGHT_HAND: Self = SkeletonId::Hand(Handedness::Right);

    pub fn kind(&self) -> SkeletonKind {
        match self {
            SkeletonId::Hand(_) => SkeletonKind::Hand,
            SkeletonId::Body => SkeletonKind::Body,
        }
    }
}

impl fmt::Display for SkeletonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkeletonId::Hand(Handedness::Left) => write!(f, "left"),
            SkeletonId::Hand(Handedness::Right) => write!(f, "right"),
            SkeletonId::Body => write!(f, "body"),
        }
    }
}

/// Skeleton topology family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkeletonKind {
    Hand,
    Body,
}

// MARK: - Joint ids

/// Hand joints exposed by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HandJoint {
    Wrist,
    ThumbMetacarpal,
    ThumbProximal,
    ThumbTip,
    IndexProximal,
    IndexTip,
    MiddleProximal,
    MiddleTip,
    RingProximal,
    RingTip,
    LittleProximal,
    LittleTip,
}

impl HandJoint {
    pub const ALL: [HandJoint; 12] = [
        HandJoint::Wrist,
        HandJoint::ThumbMetacarpal,
        HandJoint::ThumbProximal,
        HandJoint::ThumbTip,
        HandJoint::IndexProximal,
        HandJoint::IndexTip,
        HandJoint::MiddleProximal,
        HandJoint::MiddleTip,
        HandJoint::RingProximal,
        HandJoint::RingTip,
        HandJoint::LittleProximal,
        HandJoint::LittleTip,
    ];

    /// Name used on the telemetry wire
    pub fn wire_name(&self) -> &'static str {
        match self {
            HandJoint::Wrist => "Wrist",
            HandJoint::ThumbMetacarpal => "Thumb0",
            HandJoint::ThumbProximal => "Thumb1",
            HandJoint::ThumbTip => "ThumbTip",
            HandJoint::IndexProximal => "Index1",
            HandJoint::IndexTip => "IndexTip",
            HandJoint::MiddleProximal => "Middle1",
            HandJoint::MiddleTip => "MiddleTip",
            HandJoint::RingProximal => "Ring1",
            HandJoint::RingTip => "RingTip",
            HandJoint::LittleProximal => "Pinky1",
            HandJoint::LittleTip => "PinkyTip",
        }
    }

    /// Descriptive snake_case name, accepted in configuration
    pub fn descriptive_name(&self) -> &'static str {
        match self {
            HandJoint::Wrist => "wrist",
            HandJoint::ThumbMetacarpal => "thumb_metacarpal",
            HandJoint::ThumbProximal => "thumb_proximal",
            HandJoint::ThumbTip => "thumb_tip",
            HandJoint::IndexProximal => "index_proximal",
            HandJoint::IndexTip => "index_tip",
            HandJoint::MiddleProximal => "middle_proximal",
            HandJoint::MiddleTip => "middle_tip",
            HandJoint::RingProximal => "ring_proximal",
            HandJoint::RingTip => "ring_tip",
            HandJoint::LittleProximal => "little_proximal",
            HandJoint::LittleTip => "little_tip",
        }
    }

    pub fn is_tip(&self) -> bool {
        matches!(
            self,
            HandJoint::ThumbTip
                | HandJoint::IndexTip
                | HandJoint::MiddleTip
                | HandJoint::RingTip
                | HandJoint::LittleTip
        )
    }
}

/// Body joints exposed by the pipeline
///
/// The leg joints are not supplied by upper-body trackers; they are filled in
/// by [`crate::skeleton::estimate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BodyJoint {
    Root,
    Hips,
    SpineLower,
    SpineMiddle,
    SpineUpper,
    Chest,
    Neck,
    Head,
    LeftShoulder,
    LeftArmUpper,
    LeftArmLower,
    LeftHandWrist,
    RightShoulder,
    RightArmUpper,
    RightArmLower,
    RightHandWrist,
    LeftLegUpper,
    LeftKnee,
    LeftFoot,
    RightLegUpper,
    RightKnee,
    RightFoot,
}

impl BodyJoint {
    pub const ALL: [BodyJoint; 22] = [
        BodyJoint::Root,
        BodyJoint::Hips,
        BodyJoint::SpineLower,
        BodyJoint::SpineMiddle,
        BodyJoint::SpineUpper,
        BodyJoint::Chest,
        BodyJoint::Neck,
        BodyJoint::Head,
        BodyJoint::LeftShoulder,
        BodyJoint::LeftArmUpper,
        BodyJoint::LeftArmLower,
        BodyJoint::LeftHandWrist,
        BodyJoint::RightShoulder,
        BodyJoint::RightArmUpper,
        BodyJoint::RightArmLower,
        BodyJoint::RightHandWrist,
        BodyJoint::LeftLegUpper,
        BodyJoint::LeftKnee,
        BodyJoint::LeftFoot,
        BodyJoint::RightLegUpper,
        BodyJoint::RightKnee,
        BodyJoint::RightFoot,
    ];

    /// Name used on the telemetry wire
    pub fn wire_name(&self) -> &'static str {
        match self {
            BodyJoint::Root => "ROOT",
            BodyJoint::Hips => "HIPS",
            BodyJoint::SpineLower => "SPINE_LOWER",
            BodyJoint::SpineMiddle => "SPINE_MIDDLE",
            BodyJoint::SpineUpper => "SPINE_UPPER",
            BodyJoint::Chest => "CHEST",
            BodyJoint::Neck => "NECK",
            BodyJoint::Head => "HEAD",
            BodyJoint::LeftShoulder => "LEFT_SHOULDER",
            BodyJoint::LeftArmUpper => "LEFT_ARM_UPPER",
            BodyJoint::LeftArmLower => "LEFT_ARM_LOWER",
            BodyJoint::LeftHandWrist => "LEFT_HAND_WRIST",
            BodyJoint::RightShoulder => "RIGHT_SHOULDER",
            BodyJoint::RightArmUpper => "RIGHT_ARM_UPPER",
            BodyJoint::RightArmLower => "RIGHT_ARM_LOWER",
            BodyJoint::RightHandWrist => "RIGHT_HAND_WRIST",
            BodyJoint::LeftLegUpper => "LEFT_LEG_UPPER",
            BodyJoint::LeftKnee => "LEFT_KNEE",
            BodyJoint::LeftFoot => "LEFT_FOOT",
            BodyJoint::RightLegUpper => "RIGHT_LEG_UPPER",
            BodyJoint::RightKnee => "RIGHT_KNEE",
            BodyJoint::RightFoot => "RIGHT_FOOT",
        }
    }

    /// Leg joints are estimated from the hips, never read from a tracker
    pub fn is_estimated(&self) -> bool {
        matches!(
            self,
            BodyJoint::LeftLegUpper
                | BodyJoint::LeftKnee
                | BodyJoint::LeftFoot
                | BodyJoint::RightLegUpper
                | BodyJoint::RightKnee
                | BodyJoint::RightFoot
        )
    }
}

/// A joint of any skeleton kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JointId {
    Hand(HandJoint),
    Body(BodyJoint),
}

impl JointId {
    pub fn wire_name(&self) -> &'static str {
        match self {
            JointId::Hand(j) => j.wire_name(),
            JointId::Body(j) => j.wire_name(),
        }
    }

    pub fn kind(&self) -> SkeletonKind {
        match self {
            JointId::Hand(_) => SkeletonKind::Hand,
            JointId::Body(_) => SkeletonKind::Body,
        }
    }

    /// All joints of a skeleton kind, in declaration order
    pub fn all(kind: SkeletonKind) -> Vec<JointId> {
        match kind {
            SkeletonKind::Hand => HandJoint::ALL.iter().copied().map(JointId::Hand).collect(),
            SkeletonKind::Body => BodyJoint::ALL.iter().copied().map(JointId::Body).collect(),
        }
    }
}

impl From<HandJoint> for JointId {
    fn from(joint: HandJoint) -> Self {
        JointId::Hand(joint)
    }
}

impl From<BodyJoint> for JointId {
    fn from(joint: BodyJoint) -> Self {
        JointId::Body(joint)
    }
}

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Error returned when a joint name matches no known joint
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown joint name: {0}")]
pub struct UnknownJoint(pub String);

impl FromStr for HandJoint {
    type Err = UnknownJoint;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HandJoint::ALL
            .iter()
            .copied()
            .find(|j| {
                j.wire_name().eq_ignore_ascii_case(s) || j.descriptive_name().eq_ignore_ascii_case(s)
            })
            .ok_or_else(|| UnknownJoint(s.to_string()))
    }
}

impl FromStr for BodyJoint {
    type Err = UnknownJoint;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BodyJoint::ALL
            .iter()
            .copied()
            .find(|j| j.wire_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownJoint(s.to_string()))
    }
}

impl FromStr for JointId {
    type Err = UnknownJoint;

    /// Hand names are tried first; the two namespaces do not overlap.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<HandJoint>()
            .map(JointId::Hand)
            .or_else(|_| s.parse::<BodyJoint>().map(JointId::Body))
    }
}
