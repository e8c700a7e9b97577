//! Pose Telemetry
//!
//! - **envelope**: JSON wire format for joint positions
//! - **publisher**: Fixed-interval publisher over a reconnecting socket

pub mod envelope;
pub mod publisher;

pub use envelope::{JointPosition, PublishFilters, TelemetryEnvelope};
pub use publisher::{PublishStats, TelemetryChannelLogger, TelemetryPublisher, DEFAULT_PUBLISH_INTERVAL};
