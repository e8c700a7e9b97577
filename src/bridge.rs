//! Consumer Loop
//!
//! [`Bridge`] owns every collaborator, all passed in through [`BridgeParts`],
//! and advances them once per [`Bridge::tick`]. Nothing in `tick` awaits;
//! network work happens on tokio tasks owned by the socket clients and the
//! media session.
//!
//! # Architecture
//!
//! ```text
//! tick(dt)
//!   ├─ TrackingSource::update ─► SnapshotBuilder ─► LatestSnapshots
//!   │                                   └─► (estimate legs) ─► SkeletonRig
//!   ├─ TelemetryPublisher::tick(dt, &LatestSnapshots)
//!   ├─ media client tick ─► IngestQueue::try_dequeue_all ─► FrameTexture
//!   └─ MediaSessionController::poll_video_frame ──────────► FrameTexture
//! ```

use std::fmt;
use std::sync::Arc;

use crate::ingest::{IngestQueue, QueueStats};
use crate::media::{DecodedFrame, FrameIngestHandler, FrameTexture, MediaSessionController};
use crate::skeleton::{
    with_estimated_legs, LatestSnapshots, SkeletonId, SkeletonRig, SnapshotBuilder, TrackingSource,
};
use crate::socket::ReconnectingSocketClient;
use crate::telemetry::TelemetryPublisher;

/// A bridge feature that can be switched off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Rig,
    Telemetry,
    FrameChannel,
    VideoSession,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Feature::Rig => "rig",
            Feature::Telemetry => "telemetry",
            Feature::FrameChannel => "frame channel",
            Feature::VideoSession => "video session",
        };
        f.write_str(name)
    }
}

/// A feature was configured without something it depends on
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{feature} disabled: missing {collaborator}")]
pub struct MissingCollaboratorError {
    pub feature: Feature,
    pub collaborator: &'static str,
}

/// WHEP session plus where to negotiate
pub struct VideoSession {
    pub controller: MediaSessionController,
    pub endpoint: String,
    /// Negotiate on [`Bridge::start`]
    pub auto_start: bool,
}

/// Everything the bridge runs, injected by the caller
pub struct BridgeParts {
    pub tracker: Option<Box<dyn TrackingSource>>,
    pub snapshots: SnapshotBuilder,
    /// Skeletons read each tick; others stay `None` and publish `null`
    pub skeletons: Vec<SkeletonId>,
    pub estimate_lower_body: bool,
    pub rig: Option<SkeletonRig>,
    pub publisher: Option<TelemetryPublisher>,
    pub frame_client: Option<ReconnectingSocketClient>,
    pub queue_warn_depth: usize,
    pub texture: Option<FrameTexture>,
    pub video: Option<VideoSession>,
}

impl BridgeParts {
    pub fn new(snapshots: SnapshotBuilder) -> Self {
        Self {
            tracker: None,
            snapshots,
            skeletons: vec![SkeletonId::LEFT_HAND, SkeletonId::RIGHT_HAND, SkeletonId::Body],
            estimate_lower_body: true,
            rig: None,
            publisher: None,
            frame_client: None,
            queue_warn_depth: crate::ingest::DEFAULT_WARN_DEPTH,
            texture: None,
            video: None,
        }
    }
}

struct FrameChannel {
    client: ReconnectingSocketClient,
    queue: IngestQueue<DecodedFrame>,
    handler: Arc<FrameIngestHandler>,
}

/// Per-tick counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub ticks: u64,
    pub frames_applied: u64,
    pub frame_failures: u64,
    pub video_frames_applied: u64,
}

/// Single-threaded consumer of tracking and media data
pub struct Bridge {
    tracker: Option<Box<dyn TrackingSource>>,
    snapshots: SnapshotBuilder,
    skeletons: Vec<SkeletonId>,
    estimate_lower_body: bool,
    latest: LatestSnapshots,
    rig: Option<SkeletonRig>,
    publisher: Option<TelemetryPublisher>,
    frames: Option<FrameChannel>,
    texture: Option<FrameTexture>,
    video: Option<VideoSession>,
    disabled: Vec<MissingCollaboratorError>,
    stats: BridgeStats,
}

impl Bridge {
    /// Wire up the collaborators
    ///
    /// A feature whose dependencies are missing is logged and dropped; the
    /// rest of the bridge still runs.
    pub fn new(parts: BridgeParts) -> Self {
        let mut disabled = Vec::new();
        let mut disable = |feature: Feature, collaborator: &'static str| {
            let err = MissingCollaboratorError {
                feature,
                collaborator,
            };
            tracing::error!(error = %err, "Feature disabled");
            disabled.push(err);
        };

        let has_tracker = parts.tracker.is_some();
        let has_texture = parts.texture.is_some();

        let rig = match parts.rig {
            Some(_) if !has_tracker => {
                disable(Feature::Rig, "tracking source");
                None
            }
            rig => rig,
        };

        let publisher = match parts.publisher {
            Some(publisher) if !has_tracker => {
                disable(Feature::Telemetry, "tracking source");
                publisher.dispose();
                None
            }
            publisher => publisher,
        };

        let frames = match parts.frame_client {
            Some(client) if !has_texture => {
                disable(Feature::FrameChannel, "frame texture");
                client.dispose();
                None
            }
            Some(client) => {
                let (producer, queue) = IngestQueue::new(parts.queue_warn_depth);
                let handler = Arc::new(FrameIngestHandler::new(producer));
                client.set_handler(handler.clone());
                Some(FrameChannel {
                    client,
                    queue,
                    handler,
                })
            }
            None => None,
        };

        let video = match parts.video {
            Some(_) if !has_texture => {
                disable(Feature::VideoSession, "frame texture");
                None
            }
            video => video,
        };

        Self {
            tracker: parts.tracker,
            snapshots: parts.snapshots,
            skeletons: parts.skeletons,
            estimate_lower_body: parts.estimate_lower_body,
            latest: LatestSnapshots::default(),
            rig,
            publisher,
            frames,
            texture: parts.texture,
            video,
            disabled,
            stats: BridgeStats::default(),
        }
    }

    /// Open connections and begin negotiating video
    pub fn start(&self) {
        if let Some(publisher) = &self.publisher {
            publisher.start();
        }
        if let Some(frames) = &self.frames {
            tracing::info!(url = %frames.client.url(), "Starting frame channel");
            frames.client.connect();
        }
        if let Some(video) = &self.video {
            if video.auto_start {
                video.controller.spawn_session(video.endpoint.clone());
            }
        }
    }

    /// Advance every collaborator by `dt` seconds
    pub fn tick(&mut self, dt: f32) {
        self.stats.ticks += 1;

        if let Some(tracker) = self.tracker.as_mut() {
            tracker.update(dt);

            for &skeleton in &self.skeletons {
                let snapshot = self.snapshots.build(&**tracker, skeleton);

                if let Some(rig) = self.rig.as_mut() {
                    if self.estimate_lower_body && skeleton == SkeletonId::Body {
                        rig.apply(&with_estimated_legs(&snapshot));
                    } else {
                        rig.apply(&snapshot);
                    }
                }

                self.latest.set(snapshot);
            }
        }

        if let Some(publisher) = self.publisher.as_mut() {
            publisher.tick(dt, &self.latest);
        }

        if let Some(frames) = self.frames.as_mut() {
            frames.client.tick(dt);

            // Applied in arrival order; the last one stays visible
            for frame in frames.queue.try_dequeue_all() {
                let Some(texture) = self.texture.as_mut() else {
                    break;
                };
                match texture.load(&frame) {
                    Ok(()) => self.stats.frames_applied += 1,
                    Err(e) => {
                        self.stats.frame_failures += 1;
                        tracing::warn!(error = %e, size = frame.bytes.len(), "Failed to load frame");
                    }
                }
            }
        }

        if let (Some(video), Some(texture)) = (self.video.as_ref(), self.texture.as_mut()) {
            if let Some(frame) = video.controller.poll_video_frame() {
                match texture.load_rgb(&frame) {
                    Ok(()) => self.stats.video_frames_applied += 1,
                    Err(e) => {
                        self.stats.frame_failures += 1;
                        tracing::warn!(error = %e, "Failed to load video frame");
                    }
                }
            }
        }
    }

    /// Stop the video session and release the texture it was feeding
    pub async fn stop_video(&mut self) {
        let Some(video) = &self.video else {
            return;
        };
        video.controller.stop_session().await;
        if let Some(texture) = self.texture.as_mut() {
            texture.release();
        }
    }

    /// Close sockets, drop pending frames and stop the video session
    pub async fn shutdown(&mut self) {
        tracing::info!(ticks = self.stats.ticks, "Shutting down bridge");

        if let Some(publisher) = &self.publisher {
            publisher.dispose();
        }
        if let Some(frames) = self.frames.as_mut() {
            frames.client.dispose();
            frames.queue.close();
        }
        self.stop_video().await;
        if let Some(texture) = self.texture.as_mut() {
            texture.release();
        }
    }

    pub fn latest(&self) -> &LatestSnapshots {
        &self.latest
    }

    pub fn rig(&self) -> Option<&SkeletonRig> {
        self.rig.as_ref()
    }

    pub fn publisher(&self) -> Option<&TelemetryPublisher> {
        self.publisher.as_ref()
    }

    pub fn texture(&self) -> Option<&FrameTexture> {
        self.texture.as_ref()
    }

    pub fn video(&self) -> Option<&MediaSessionController> {
        self.video.as_ref().map(|v| &v.controller)
    }

    pub fn frame_client(&self) -> Option<&ReconnectingSocketClient> {
        self.frames.as_ref().map(|f| &f.client)
    }

    /// (decoded, rejected) counts on the frame channel
    pub fn frame_counts(&self) -> Option<(u64, u64)> {
        self.frames.as_ref().map(|f| f.handler.counts())
    }

    pub fn queue_stats(&self) -> Option<QueueStats> {
        self.frames.as_ref().map(|f| f.queue.stats())
    }

    /// Features dropped at construction
    pub fn disabled_features(&self) -> &[MissingCollaboratorError] {
        &self.disabled
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }
}
