//! # posebridge
//!
//! Pose telemetry and media ingestion bridge. Streams hand and body joint
//! positions to a sensing host over WebSocket, receives JPEG frames and WHEP
//! video back, and mirrors the joints into a debug rig.
//!
//! ## Features
//!
//! - **Reconnecting sockets**: Fixed-interval re-dial driven by the consumer tick
//! - **Non-blocking hand-off**: Network tasks feed a FIFO drained once per tick
//! - **Latest-wins telemetry**: 2 Hz JSON envelopes, `null` for untracked skeletons
//! - **WHEP video**: Offer/answer negotiation as an explicit state machine
//!
//! ## Modules
//!
//! - [`skeleton`]: Joint ids, hierarchy, snapshots and the debug rig
//! - [`socket`]: Reconnecting text WebSocket client
//! - [`ingest`]: Cross-task frame queue
//! - [`media`]: Frame decoding, texture, WHEP signaling and sessions
//! - [`telemetry`]: Outbound joint envelopes
//! - [`bridge`]: The consumer loop
//! - [`config`]: TOML and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use posebridge::bridge::{Bridge, BridgeParts};
//! use posebridge::skeleton::{JointFilter, SkeletonKind, SnapshotBuilder, SyntheticTracker};
//! use posebridge::socket::ReconnectingSocketClient;
//! use posebridge::telemetry::{PublishFilters, TelemetryPublisher, DEFAULT_PUBLISH_INTERVAL};
//!
//! #[tokio::main]
//! async fn main() {
//!     let builder = SnapshotBuilder::new(
//!         JointFilter::all(SkeletonKind::Hand),
//!         JointFilter::all(SkeletonKind::Body),
//!     );
//!
//!     let mut parts = BridgeParts::new(builder);
//!     parts.tracker = Some(Box::new(SyntheticTracker::new()));
//!     parts.publisher = Some(TelemetryPublisher::new(
//!         ReconnectingSocketClient::new("telemetry", "ws://127.0.0.1:9090"),
//!         PublishFilters::default(),
//!         DEFAULT_PUBLISH_INTERVAL,
//!     ));
//!
//!     let mut bridge = Bridge::new(parts);
//!     bridge.start();
//!
//!     let mut interval = tokio::time::interval(std::time::Duration::from_millis(16));
//!     loop {
//!         interval.tick().await;
//!         bridge.tick(0.016);
//!     }
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod ingest;
pub mod media;
pub mod skeleton;
pub mod socket;
pub mod telemetry;

// Re-export top-level types for convenience
pub use bridge::{Bridge, BridgeParts, BridgeStats, Feature, MissingCollaboratorError, VideoSession};

pub use config::{generate_default_config, Config, ConfigError, LoggingConfig};

pub use ingest::{IngestProducer, IngestQueue, QueueStats};

pub use media::{
    DecodeError, DecodedFrame, FrameDecoder, FrameTexture, MediaSessionController,
    NegotiationError, SessionState, VideoFrame, WhepClient,
};

pub use skeleton::{
    JointHierarchy, JointId, SkeletonId, SkeletonRig, SkeletonSnapshot, SnapshotBuilder,
    TrackingSource,
};

pub use socket::{ConnectionState, ReconnectingSocketClient, SocketHandler, TransportError};

pub use telemetry::{PublishFilters, TelemetryEnvelope, TelemetryPublisher};
