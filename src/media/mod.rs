//! Media Ingestion
//!
//! Two independent video paths from the sensing host:
//!
//! - **decoder**: JSON-wrapped or bare base64 JPEG frames from the media socket
//! - **texture**: Consumer-side RGB texture fed from decoded frames
//! - **whep**: HTTP offer/answer signaling
//! - **session**: WebRTC negotiation state machine and track lifecycle
//! - **rtc**: webrtc-rs peer connections (`webrtc` feature)
//!
//! # Architecture
//!
//! ```text
//! media socket ─► FrameIngestHandler ─► IngestQueue ─► tick ─► FrameTexture
//!
//! MediaSessionController ─► MediaPeer (offer) ─► WhepClient (POST) ─► MediaPeer (answer)
//!
//! remote track ─► H.264 decode ─► IngestQueue ─► tick ─► FrameTexture
//! ```

pub mod decoder;
#[cfg(feature = "webrtc")]
pub mod rtc;
pub mod session;
pub mod texture;
pub mod whep;

pub use decoder::{
    DecodeError, DecodedFrame, FrameDecoder, FrameEnvelope, FrameIngestHandler, FrameMeta,
};
#[cfg(feature = "webrtc")]
pub use rtc::{RtcPeer, RtcPeerFactory};
pub use session::{
    MediaPeer, MediaSessionController, NegotiationError, NegotiationStage, PeerFactory,
    RemoteTrack, SessionState, TrackCallback, VideoFrame, VideoFrameSink,
};
pub use texture::{FrameTexture, TextureError};
pub use whep::{SdpAnswer, SignalingChannel, SignalingError, WhepClient};
