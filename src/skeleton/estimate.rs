//! Lower-body estimation
//!
//! Upper-body trackers report nothing below the hips. For the debug rig the
//! legs are filled in with fixed offsets scaled to typical body proportions.
//! These samples are visual only and are never published as telemetry.

use super::snapshot::{JointSample, SkeletonSnapshot};
use super::types::{BodyJoint, JointId, Vec3};

const LEG_UPPER_OFFSET: Vec3 = Vec3::new(0.1, -0.3, 0.0);
const KNEE_OFFSET: Vec3 = Vec3::new(0.0, -0.4, 0.0);
const FOOT_OFFSET: Vec3 = Vec3::new(0.0, -0.4, 0.1);

/// Estimated leg joints for a hips position
pub fn estimate_lower_body(hips: Vec3) -> Vec<JointSample> {
    let mut samples = Vec::with_capacity(6);

    for (mirror, upper, knee, foot) in [
        (
            -1.0,
            BodyJoint::LeftLegUpper,
            BodyJoint::LeftKnee,
            BodyJoint::LeftFoot,
        ),
        (
            1.0,
            BodyJoint::RightLegUpper,
            BodyJoint::RightKnee,
            BodyJoint::RightFoot,
        ),
    ] {
        let leg_upper = hips
            + Vec3::new(
                LEG_UPPER_OFFSET.x * mirror,
                LEG_UPPER_OFFSET.y,
                LEG_UPPER_OFFSET.z,
            );
        let knee_pos = leg_upper + KNEE_OFFSET;
        let foot_pos = knee_pos + FOOT_OFFSET;

        samples.push(JointSample::new(JointId::Body(upper), leg_upper));
        samples.push(JointSample::new(JointId::Body(knee), knee_pos));
        samples.push(JointSample::new(JointId::Body(foot), foot_pos));
    }

    samples
}

/// Body snapshot extended with estimated legs
///
/// Returns the snapshot unchanged when it is not tracked or has no hips.
pub fn with_estimated_legs(snapshot: &SkeletonSnapshot) -> SkeletonSnapshot {
    let Some(hips) = snapshot.get(JointId::Body(BodyJoint::Hips)) else {
        return snapshot.clone();
    };

    let mut joints = snapshot.joints().to_vec();
    joints.extend(estimate_lower_body(hips.position));
    SkeletonSnapshot::tracked(snapshot.skeleton(), joints)
}
