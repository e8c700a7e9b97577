//! Skeleton snapshots
//!
//! A snapshot is one tick's readout of a skeleton, rebuilt wholesale each
//! tick. Lost tracking is its own variant rather than an empty joint list, so
//! consumers can tell "confirmed untracked" from "tracked with no joints".

use super::tracking::TrackingSource;
use super::types::{Handedness, JointId, Pose, Quat, SkeletonId, SkeletonKind, UnknownJoint, Vec3};

/// One joint reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointSample {
    pub joint: JointId,
    pub position: Vec3,
    pub orientation: Option<Quat>,
}

impl JointSample {
    pub fn new(joint: JointId, position: Vec3) -> Self {
        Self {
            joint,
            position,
            orientation: None,
        }
    }

    pub fn from_pose(joint: JointId, pose: Pose) -> Self {
        Self {
            joint,
            position: pose.position,
            orientation: pose.orientation,
        }
    }

    pub fn name(&self) -> &'static str {
        self.joint.wire_name()
    }
}

/// One tick's readout of a skeleton
#[derive(Debug, Clone, PartialEq)]
pub enum SkeletonSnapshot {
    Tracked {
        skeleton: SkeletonId,
        joints: Vec<JointSample>,
    },
    NotTracked {
        skeleton: SkeletonId,
    },
}

impl SkeletonSnapshot {
    pub fn tracked(skeleton: SkeletonId, joints: Vec<JointSample>) -> Self {
        SkeletonSnapshot::Tracked { skeleton, joints }
    }

    pub fn not_tracked(skeleton: SkeletonId) -> Self {
        SkeletonSnapshot::NotTracked { skeleton }
    }

    pub fn skeleton(&self) -> SkeletonId {
        match self {
            SkeletonSnapshot::Tracked { skeleton, .. } | SkeletonSnapshot::NotTracked { skeleton } => {
                *skeleton
            }
        }
    }

    pub fn is_tracked(&self) -> bool {
        matches!(self, SkeletonSnapshot::Tracked { .. })
    }

    /// Joint samples; empty when not tracked
    pub fn joints(&self) -> &[JointSample] {
        match self {
            SkeletonSnapshot::Tracked { joints, .. } => joints,
            SkeletonSnapshot::NotTracked { .. } => &[],
        }
    }

    pub fn get(&self, joint: JointId) -> Option<&JointSample> {
        self.joints().iter().find(|s| s.joint == joint)
    }

    /// Copy restricted to `filter`, keeping snapshot order
    pub fn filtered(&self, filter: &JointFilter) -> SkeletonSnapshot {
        match self {
            SkeletonSnapshot::Tracked { skeleton, joints } => SkeletonSnapshot::Tracked {
                skeleton: *skeleton,
                joints: joints
                    .iter()
                    .filter(|s| filter.contains(s.joint))
                    .copied()
                    .collect(),
            },
            SkeletonSnapshot::NotTracked { skeleton } => SkeletonSnapshot::not_tracked(*skeleton),
        }
    }
}

/// Ordered subset of joints to read for a skeleton kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JointFilter {
    joints: Vec<JointId>,
}

impl JointFilter {
    pub fn new(joints: impl IntoIterator<Item = JointId>) -> Self {
        let mut unique = Vec::new();
        for joint in joints {
            if !unique.contains(&joint) {
                unique.push(joint);
            }
        }
        Self { joints: unique }
    }

    /// Every joint of a kind
    pub fn all(kind: SkeletonKind) -> Self {
        Self::new(JointId::all(kind))
    }

    /// Parse configured joint names
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self, UnknownJoint> {
        let joints = names
            .iter()
            .map(|n| n.as_ref().parse::<JointId>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(joints))
    }

    pub fn joints(&self) -> &[JointId] {
        &self.joints
    }

    pub fn contains(&self, joint: JointId) -> bool {
        self.joints.contains(&joint)
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }
}

/// Builds snapshots from a tracking source
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    hand_filter: JointFilter,
    body_filter: JointFilter,
}

impl SnapshotBuilder {
    pub fn new(hand_filter: JointFilter, body_filter: JointFilter) -> Self {
        Self {
            hand_filter,
            body_filter,
        }
    }

    pub fn filter_for(&self, kind: SkeletonKind) -> &JointFilter {
        match kind {
            SkeletonKind::Hand => &self.hand_filter,
            SkeletonKind::Body => &self.body_filter,
        }
    }

    /// Read one skeleton
    ///
    /// Joints the source does not expose are logged and skipped; partial
    /// data is still returned as tracked.
    pub fn build(&self, source: &dyn TrackingSource, skeleton: SkeletonId) -> SkeletonSnapshot {
        if !source.is_tracked(skeleton) {
            tracing::trace!(skeleton = %skeleton, source = source.name(), "Skeleton not tracked");
            return SkeletonSnapshot::not_tracked(skeleton);
        }

        let filter = self.filter_for(skeleton.kind());
        let mut joints = Vec::with_capacity(filter.len());

        for &joint in filter.joints() {
            if joint.kind() != skeleton.kind() {
                continue;
            }
            match source.joint_pose(skeleton, joint) {
                Some(pose) => joints.push(JointSample::from_pose(joint, pose)),
                None => {
                    tracing::warn!(
                        skeleton = %skeleton,
                        joint = %joint,
                        source = source.name(),
                        "Failed to get joint pose"
                    );
                }
            }
        }

        SkeletonSnapshot::tracked(skeleton, joints)
    }
}

/// The most recent snapshot per skeleton
///
/// `None` means the tracker feeding that skeleton is disabled or absent.
#[derive(Debug, Clone, Default)]
pub struct LatestSnapshots {
    pub left_hand: Option<SkeletonSnapshot>,
    pub right_hand: Option<SkeletonSnapshot>,
    pub body: Option<SkeletonSnapshot>,
}

impl LatestSnapshots {
    pub fn get(&self, skeleton: SkeletonId) -> Option<&SkeletonSnapshot> {
        match skeleton {
            SkeletonId::Hand(Handedness::Left) => self.left_hand.as_ref(),
            SkeletonId::Hand(Handedness::Right) => self.right_hand.as_ref(),
            SkeletonId::Body => self.body.as_ref(),
        }
    }

    pub fn set(&mut self, snapshot: SkeletonSnapshot) {
        let slot = match snapshot.skeleton() {
            SkeletonId::Hand(Handedness::Left) => &mut self.left_hand,
            SkeletonId::Hand(Handedness::Right) => &mut self.right_hand,
            SkeletonId::Body => &mut self.body,
        };
        *slot = Some(snapshot);
    }

    pub fn clear(&mut self, skeleton: SkeletonId) {
        match skeleton {
            SkeletonId::Hand(Handedness::Left) => self.left_hand = None,
            SkeletonId::Hand(Handedness::Right) => self.right_hand = None,
            SkeletonId::Body => self.body = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::tracking::SyntheticTracker;
    use crate::skeleton::types::{BodyJoint, HandJoint};

    fn builder() -> SnapshotBuilder {
        SnapshotBuilder::new(
            JointFilter::parse(&["Thumb0", "Index1", "IndexTip"]).unwrap(),
            JointFilter::parse(&["HEAD", "HIPS"]).unwrap(),
        )
    }

    #[test]
    fn test_build_tracked_follows_filter_order() {
        let tracker = SyntheticTracker::new().still();
        let snapshot = builder().build(&tracker, SkeletonId::LEFT_HAND);

        assert!(snapshot.is_tracked());
        let names: Vec<&str> = snapshot.joints().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["Thumb0", "Index1", "IndexTip"]);
        assert!(snapshot.joints()[0].orientation.is_some());
    }

    #[test]
    fn test_build_not_tracked_is_distinct_from_empty() {
        let mut tracker = SyntheticTracker::new();
        tracker.set_tracked(SkeletonId::RIGHT_HAND, false);

        let snapshot = builder().build(&tracker, SkeletonId::RIGHT_HAND);
        assert_eq!(snapshot, SkeletonSnapshot::not_tracked(SkeletonId::RIGHT_HAND));
        assert!(snapshot.joints().is_empty());
        assert_ne!(snapshot, SkeletonSnapshot::tracked(SkeletonId::RIGHT_HAND, vec![]));
    }

    #[test]
    fn test_missing_joint_is_skipped_not_fatal() {
        let mut tracker = SyntheticTracker::new();
        tracker.hide_joint(SkeletonId::Body, JointId::Body(BodyJoint::Head));

        let snapshot = builder().build(&tracker, SkeletonId::Body);
        assert!(snapshot.is_tracked());
        assert_eq!(snapshot.joints().len(), 1);
        assert_eq!(snapshot.joints()[0].joint, JointId::Body(BodyJoint::Hips));
    }

    #[test]
    fn test_filter_dedups_and_ignores_other_kind() {
        let filter = JointFilter::parse(&["Wrist", "wrist", "HEAD"]).unwrap();
        assert_eq!(filter.len(), 2);

        let builder = SnapshotBuilder::new(filter.clone(), filter);
        let snapshot = builder.build(&SyntheticTracker::new(), SkeletonId::LEFT_HAND);
        assert_eq!(snapshot.joints().len(), 1);
        assert_eq!(snapshot.joints()[0].joint, JointId::Hand(HandJoint::Wrist));
    }

    #[test]
    fn test_filtered_keeps_not_tracked() {
        let filter = JointFilter::parse(&["HEAD"]).unwrap();
        let snapshot = SkeletonSnapshot::not_tracked(SkeletonId::Body);
        assert!(!snapshot.filtered(&filter).is_tracked());
    }

    #[test]
    fn test_latest_snapshots_slots() {
        let mut latest = LatestSnapshots::default();
        latest.set(SkeletonSnapshot::not_tracked(SkeletonId::Body));
        assert!(latest.get(SkeletonId::Body).is_some());
        assert!(latest.get(SkeletonId::LEFT_HAND).is_none());

        latest.clear(SkeletonId::Body);
        assert!(latest.body.is_none());
    }
}
