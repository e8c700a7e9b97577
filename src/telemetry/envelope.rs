//! Outbound telemetry envelope
//!
//! Wire format:
//!
//! ```json
//! {"Left_Hand":[{"name":"Thumb0","x":0.1,"y":0.2,"z":0.3}],"Right_Hand":null,"Body":null}
//! ```
//!
//! A field is `null` when its tracker is disabled or currently untracked, and
//! an array (possibly empty) when tracked.

use serde::{Deserialize, Serialize};

use crate::skeleton::{
    BodyJoint, JointFilter, JointId, LatestSnapshots, SkeletonId, SkeletonKind, SkeletonSnapshot,
};

/// One joint on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointPosition {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// One publish message
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TelemetryEnvelope {
    #[serde(rename = "Left_Hand")]
    pub left_hand: Option<Vec<JointPosition>>,
    #[serde(rename = "Right_Hand")]
    pub right_hand: Option<Vec<JointPosition>>,
    #[serde(rename = "Body")]
    pub body: Option<Vec<JointPosition>>,
}

/// What published telemetry includes
#[derive(Debug, Clone, PartialEq)]
pub struct PublishFilters {
    /// Skeletons on the wire; the rest always publish `null`
    pub skeletons: Vec<SkeletonId>,
    pub hand: JointFilter,
    pub body: JointFilter,
}

impl PublishFilters {
    pub fn publishes(&self, skeleton: SkeletonId) -> bool {
        self.skeletons.contains(&skeleton)
    }

    pub fn for_kind(&self, kind: SkeletonKind) -> &JointFilter {
        match kind {
            SkeletonKind::Hand => &self.hand,
            SkeletonKind::Body => &self.body,
        }
    }
}

impl Default for PublishFilters {
    /// Every skeleton and hand joint; head and hips for the body
    fn default() -> Self {
        Self {
            skeletons: vec![SkeletonId::LEFT_HAND, SkeletonId::RIGHT_HAND, SkeletonId::Body],
            hand: JointFilter::all(SkeletonKind::Hand),
            body: JointFilter::new([JointId::Body(BodyJoint::Head), JointId::Body(BodyJoint::Hips)]),
        }
    }
}

impl TelemetryEnvelope {
    /// Build from the latest snapshots
    pub fn from_snapshots(latest: &LatestSnapshots, filters: &PublishFilters) -> Self {
        let field = |skeleton: SkeletonId| {
            if !filters.publishes(skeleton) {
                return None;
            }
            encode_field(latest.get(skeleton), filters.for_kind(skeleton.kind()))
        };

        Self {
            left_hand: field(SkeletonId::LEFT_HAND),
            right_hand: field(SkeletonId::RIGHT_HAND),
            body: field(SkeletonId::Body),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn encode_field(
    snapshot: Option<&SkeletonSnapshot>,
    filter: &JointFilter,
) -> Option<Vec<JointPosition>> {
    match snapshot? {
        SkeletonSnapshot::NotTracked { .. } => None,
        SkeletonSnapshot::Tracked { joints, .. } => Some(
            joints
                .iter()
                .filter(|s| filter.contains(s.joint))
                .map(|s| JointPosition {
                    name: s.name().to_string(),
                    x: s.position.x,
                    y: s.position.y,
                    z: s.position.z,
                })
                .collect(),
        ),
    }
}
