//! Tracking sources
//!
//! The XR runtime that produces joint transforms is an external collaborator.
//! It is reached through [`TrackingSource`]; [`SyntheticTracker`] is a
//! deterministic stand-in that animates plausible hands and an upper body so
//! the pipeline can run on a desktop without a headset.

use std::collections::HashSet;

use super::types::{BodyJoint, HandJoint, Handedness, JointId, Pose, Quat, SkeletonId, Vec3};

/// Supplies joint poses once per consumer tick
pub trait TrackingSource: Send {
    /// Short name used in log lines
    fn name(&self) -> &str;

    /// Advance the source; called once per tick before any reads
    fn update(&mut self, _dt: f32) {}

    /// Whether the skeleton currently has valid tracking data
    fn is_tracked(&self, skeleton: SkeletonId) -> bool;

    /// Pose of one joint, or `None` if the source does not expose it this tick
    fn joint_pose(&self, skeleton: SkeletonId, joint: JointId) -> Option<Pose>;
}

/// Animated tracking source for headless runs and tests
#[derive(Debug, Clone)]
pub struct SyntheticTracker {
    elapsed: f32,
    untracked: HashSet<SkeletonId>,
    hidden_joints: HashSet<(SkeletonId, JointId)>,
    /// Wave amplitude in meters
    amplitude: f32,
}

impl SyntheticTracker {
    pub fn new() -> Self {
        Self {
            elapsed: 0.0,
            untracked: HashSet::new(),
            hidden_joints: HashSet::new(),
            amplitude: 0.03,
        }
    }

    /// Disable motion so poses are time-invariant
    pub fn still(mut self) -> Self {
        self.amplitude = 0.0;
        self
    }

    /// Mark a skeleton tracked or lost
    pub fn set_tracked(&mut self, skeleton: SkeletonId, tracked: bool) {
        if tracked {
            self.untracked.remove(&skeleton);
        } else {
            self.untracked.insert(skeleton);
        }
    }

    /// Stop exposing a single joint (simulates partial SDK coverage)
    pub fn hide_joint(&mut self, skeleton: SkeletonId, joint: JointId) {
        self.hidden_joints.insert((skeleton, joint));
    }

    fn sway(&self, phase: f32) -> f32 {
        self.amplitude * (self.elapsed * 1.5 + phase).sin()
    }

    fn hand_pose(&self, side: Handedness, joint: HandJoint) -> Pose {
        let mirror = match side {
            Handedness::Left => -1.0,
            Handedness::Right => 1.0,
        };
        let wrist = Vec3::new(0.2 * mirror, 1.2 + self.sway(0.0), 0.4);
        let (x, y, z) = hand_offset(joint);
        let curl = if joint.is_tip() { self.sway(1.0) } else { 0.0 };

        Pose::at(wrist + Vec3::new(x * mirror, y + curl, z))
            .with_orientation(Quat::from_yaw(0.3 * mirror))
    }

    fn body_pose(&self, joint: BodyJoint) -> Pose {
        let root = Vec3::new(0.0, 0.95, 0.0);
        let (x, y, z) = body_offset(joint);
        let breathe = if matches!(joint, BodyJoint::Chest | BodyJoint::Neck | BodyJoint::Head) {
            self.sway(0.5) * 0.3
        } else {
            0.0
        };

        Pose::at(root + Vec3::new(x, y + breathe, z)).with_orientation(Quat::IDENTITY)
    }
}

impl Default for SyntheticTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackingSource for SyntheticTracker {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn update(&mut self, dt: f32) {
        self.elapsed += dt;
    }

    fn is_tracked(&self, skeleton: SkeletonId) -> bool {
        !self.untracked.contains(&skeleton)
    }

    fn joint_pose(&self, skeleton: SkeletonId, joint: JointId) -> Option<Pose> {
        if self.untracked.contains(&skeleton) || self.hidden_joints.contains(&(skeleton, joint)) {
            return None;
        }

        match (skeleton, joint) {
            (SkeletonId::Hand(side), JointId::Hand(j)) => Some(self.hand_pose(side, j)),
            // Upper-body trackers never report legs
            (SkeletonId::Body, JointId::Body(j)) if !j.is_estimated() => Some(self.body_pose(j)),
            _ => None,
        }
    }
}

/// Right-hand joint offsets from the wrist (meters)
fn hand_offset(joint: HandJoint) -> (f32, f32, f32) {
    match joint {
        HandJoint::Wrist => (0.0, 0.0, 0.0),
        HandJoint::ThumbMetacarpal => (-0.025, 0.0, 0.02),
        HandJoint::ThumbProximal => (-0.045, 0.0, 0.045),
        HandJoint::ThumbTip => (-0.06, 0.0, 0.08),
        HandJoint::IndexProximal => (-0.02, 0.0, 0.09),
        HandJoint::IndexTip => (-0.025, 0.0, 0.16),
        HandJoint::MiddleProximal => (0.0, 0.0, 0.095),
        HandJoint::MiddleTip => (0.0, 0.0, 0.17),
        HandJoint::RingProximal => (0.02, 0.0, 0.09),
        HandJoint::RingTip => (0.025, 0.0, 0.155),
        HandJoint::LittleProximal => (0.038, 0.0, 0.08),
        HandJoint::LittleTip => (0.05, 0.0, 0.13),
    }
}

/// Upper-body joint offsets from the root (meters)
fn body_offset(joint: BodyJoint) -> (f32, f32, f32) {
    match joint {
        BodyJoint::Root => (0.0, 0.0, 0.0),
        BodyJoint::Hips => (0.0, 0.05, 0.0),
        BodyJoint::SpineLower => (0.0, 0.15, 0.0),
        BodyJoint::SpineMiddle => (0.0, 0.27, 0.0),
        BodyJoint::SpineUpper => (0.0, 0.38, 0.0),
        BodyJoint::Chest => (0.0, 0.48, 0.0),
        BodyJoint::Neck => (0.0, 0.62, 0.0),
        BodyJoint::Head => (0.0, 0.75, 0.0),
        BodyJoint::LeftShoulder => (-0.18, 0.56, 0.0),
        BodyJoint::LeftArmUpper => (-0.22, 0.52, 0.0),
        BodyJoint::LeftArmLower => (-0.25, 0.25, 0.1),
        BodyJoint::LeftHandWrist => (-0.2, 0.25, 0.4),
        BodyJoint::RightShoulder => (0.18, 0.56, 0.0),
        BodyJoint::RightArmUpper => (0.22, 0.52, 0.0),
        BodyJoint::RightArmLower => (0.25, 0.25, 0.1),
        BodyJoint::RightHandWrist => (0.2, 0.25, 0.4),
        // Not reported; see is_estimated
        BodyJoint::LeftLegUpper
        | BodyJoint::LeftKnee
        | BodyJoint::LeftFoot
        | BodyJoint::RightLegUpper
        | BodyJoint::RightKnee
        | BodyJoint::RightFoot => (0.0, 0.0, 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hands_are_mirrored() {
        let tracker = SyntheticTracker::new().still();
        let index = JointId::Hand(HandJoint::IndexTip);

        let left = tracker.joint_pose(SkeletonId::LEFT_HAND, index).unwrap();
        let right = tracker.joint_pose(SkeletonId::RIGHT_HAND, index).unwrap();
        assert!((left.position.x + right.position.x).abs() < 1e-6);
        assert_eq!(left.position.y, right.position.y);
    }

    #[test]
    fn test_tracking_loss_hides_all_joints() {
        let mut tracker = SyntheticTracker::new();
        tracker.set_tracked(SkeletonId::Body, false);

        assert!(!tracker.is_tracked(SkeletonId::Body));
        assert!(tracker
            .joint_pose(SkeletonId::Body, JointId::Body(BodyJoint::Head))
            .is_none());
        assert!(tracker.is_tracked(SkeletonId::LEFT_HAND));
    }

    #[test]
    fn test_legs_not_reported() {
        let tracker = SyntheticTracker::new();
        assert!(tracker
            .joint_pose(SkeletonId::Body, JointId::Body(BodyJoint::LeftKnee))
            .is_none());
    }

    #[test]
    fn test_update_moves_tips() {
        let mut tracker = SyntheticTracker::new();
        let tip = JointId::Hand(HandJoint::ThumbTip);
        let before = tracker.joint_pose(SkeletonId::RIGHT_HAND, tip).unwrap();
        tracker.update(0.5);
        let after = tracker.joint_pose(SkeletonId::RIGHT_HAND, tip).unwrap();
        assert_ne!(before.position, after.position);
    }
}
