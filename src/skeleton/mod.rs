//! Skeleton Model
//!
//! Joint identities, the static hierarchy, and the per-tick readout of a
//! tracking source:
//!
//! - **types**: Joint ids, skeleton ids, positions and orientations
//! - **hierarchy**: Joint → parent table
//! - **tracking**: The `TrackingSource` seam and a synthetic source
//! - **snapshot**: Filtered per-tick snapshots
//! - **estimate**: Leg estimation from the hips
//! - **rig**: Keyed arena of joint/bone visuals
//!
//! # Architecture
//!
//! ```text
//! TrackingSource ──update(dt)──► SnapshotBuilder ──► SkeletonSnapshot
//!                                                      │
//!                                   ┌──────────────────┴─────────┐
//!                                   ▼                            ▼
//!                       estimate ─► SkeletonRig         TelemetryPublisher
//! ```

pub mod estimate;
pub mod hierarchy;
pub mod rig;
pub mod snapshot;
pub mod tracking;
pub mod types;

pub use estimate::{estimate_lower_body, with_estimated_legs};
pub use hierarchy::{Bone, JointHierarchy};
pub use rig::{BoneVisual, JointVisual, RigStats, RigStyle, SkeletonRig};
pub use snapshot::{JointFilter, JointSample, LatestSnapshots, SkeletonSnapshot, SnapshotBuilder};
pub use tracking::{SyntheticTracker, TrackingSource};
pub use types::{
    BodyJoint, HandJoint, Handedness, JointId, Pose, Quat, SkeletonId, SkeletonKind, UnknownJoint,
    Vec3,
};
