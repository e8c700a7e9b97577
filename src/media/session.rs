//! Media session controller
//!
//! Drives one receive-only WebRTC session through WHEP signaling as an
//! explicit state machine:
//!
//! ```text
//! Idle ─► OfferCreated ─► LocalSet ─► AwaitingAnswer ─► RemoteSet ─► Active
//!   ▲          │              │              │               │
//!   │          └──────────────┴──────┬───────┴───────────────┘
//!   │                                ▼
//!   └──────── start_session ◄── Failed { stage, reason }
//! ```
//!
//! Any failed step tears the attempt down and parks the controller in
//! `Failed`. Nothing retries on its own; the caller decides when to call
//! `start_session` again. `stop_session` returns to `Idle` from anywhere,
//! and an attempt it interrupts ends as `Cancelled` without touching the state.
//!
//! The peer connection is reached through [`PeerFactory`] / [`MediaPeer`] so
//! the state machine does not depend on a particular WebRTC stack. Decoded
//! frames come back through a per-session [`IngestQueue`] that the consumer
//! polls with [`MediaSessionController::poll_video_frame`].

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use super::whep::SignalingChannel;
use crate::ingest::{IngestProducer, IngestQueue, DEFAULT_WARN_DEPTH};

/// SDP attribute every usable offer must carry
const ICE_UFRAG_ATTR: &str = "a=ice-ufrag";

/// Negotiation step, used to report where an attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationStage {
    CreatePeer,
    AddTransceiver,
    CreateOffer,
    SetLocalDescription,
    Signaling,
    SetRemoteDescription,
}

impl fmt::Display for NegotiationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NegotiationStage::CreatePeer => "create_peer",
            NegotiationStage::AddTransceiver => "add_transceiver",
            NegotiationStage::CreateOffer => "create_offer",
            NegotiationStage::SetLocalDescription => "set_local_description",
            NegotiationStage::Signaling => "signaling",
            NegotiationStage::SetRemoteDescription => "set_remote_description",
        };
        f.write_str(s)
    }
}

/// Where the controller is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    OfferCreated,
    LocalSet,
    AwaitingAnswer,
    RemoteSet,
    Active,
    Failed {
        stage: NegotiationStage,
        reason: String,
    },
}

impl SessionState {
    /// Whether `start_session` may begin from here
    pub fn can_start(&self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Failed { .. })
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => f.write_str("idle"),
            SessionState::OfferCreated => f.write_str("offer_created"),
            SessionState::LocalSet => f.write_str("local_set"),
            SessionState::AwaitingAnswer => f.write_str("awaiting_answer"),
            SessionState::RemoteSet => f.write_str("remote_set"),
            SessionState::Active => f.write_str("active"),
            SessionState::Failed { stage, .. } => write!(f, "failed({})", stage),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("Negotiation failed at {stage}: {reason}")]
    Failed {
        stage: NegotiationStage,
        reason: String,
    },

    #[error("Session already in progress ({0})")]
    Busy(String),

    #[error("Session stopped during negotiation")]
    Cancelled,
}

impl NegotiationError {
    pub fn stage(&self) -> Option<NegotiationStage> {
        match self {
            NegotiationError::Failed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Remote video track delivered by the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub id: String,
    /// Media kind as reported by the peer, e.g. `video`
    pub kind: String,
}

pub type TrackCallback = Box<dyn Fn(RemoteTrack) + Send + Sync>;

/// One decoded picture from the remote track
#[derive(Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Row-major RGB8
    pub pixels: Vec<u8>,
}

impl fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Where a peer pushes decoded frames; closed when the session is torn down
pub type VideoFrameSink = IngestProducer<VideoFrame>;

/// One peer connection
///
/// Errors are plain strings; the controller attaches the stage.
#[async_trait]
pub trait MediaPeer: Send + Sync {
    /// Register the callback fired when a remote track arrives
    fn on_track(&self, callback: TrackCallback);

    /// Register where decoded frames of the remote track go
    fn on_video_frame(&self, sink: VideoFrameSink);

    /// Add a receive-only video transceiver
    async fn add_video_receiver(&self) -> Result<(), String>;

    async fn create_offer(&self) -> Result<String, String>;

    /// Apply the offer locally and return the SDP to signal
    ///
    /// Implementations that gather ICE candidates before signaling return
    /// the completed description here.
    async fn set_local_description(&self, offer_sdp: &str) -> Result<String, String>;

    async fn set_remote_answer(&self, answer_sdp: &str) -> Result<(), String>;

    async fn close(&self) -> Result<(), String>;
}

/// Creates peer connections
#[async_trait]
pub trait PeerFactory: Send + Sync {
    async fn create_peer(&self, ice_servers: &[String]) -> Result<Arc<dyn MediaPeer>, String>;
}

struct LiveSession {
    peer: Arc<dyn MediaPeer>,
    resource_url: Option<String>,
    frames: IngestQueue<VideoFrame>,
}

struct Inner {
    factory: Arc<dyn PeerFactory>,
    signaling: Arc<dyn SignalingChannel>,
    ice_servers: Vec<String>,
    state: Mutex<SessionState>,
    session: Mutex<Option<LiveSession>>,
    track: Mutex<Option<RemoteTrack>>,
    /// Newest frame handed to the consumer
    video: Mutex<Option<Arc<VideoFrame>>>,
    negotiating: AtomicBool,
    /// Bumped by every start and stop; stale negotiations notice and bail
    generation: AtomicU64,
    attempts: AtomicU64,
}

impl Inner {
    fn on_track(&self, track: RemoteTrack) {
        let mut state = self.state.lock();
        if matches!(*state, SessionState::Idle | SessionState::Failed { .. }) {
            tracing::debug!(track_id = %track.id, "Ignoring track from a finished session");
            return;
        }

        tracing::info!(track_id = %track.id, kind = %track.kind, "Video track received");
        *self.track.lock() = Some(track);
        if *state == SessionState::RemoteSet {
            *state = SessionState::Active;
        }
    }

    /// Apply `next` if `generation` is still current
    ///
    /// Checked under the state lock, which `stop_session` also takes to bump
    /// the generation.
    fn commit(&self, generation: u64, next: SessionState) -> bool {
        let mut state = self.state.lock();
        if self.generation.load(Ordering::Acquire) != generation {
            return false;
        }
        *state = next;
        true
    }
}

/// WHEP session lifecycle owner; cheap to clone
#[derive(Clone)]
pub struct MediaSessionController {
    inner: Arc<Inner>,
}

impl MediaSessionController {
    pub fn new(
        factory: Arc<dyn PeerFactory>,
        signaling: Arc<dyn SignalingChannel>,
        ice_servers: Vec<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                factory,
                signaling,
                ice_servers,
                state: Mutex::new(SessionState::Idle),
                session: Mutex::new(None),
                track: Mutex::new(None),
                video: Mutex::new(None),
                negotiating: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                attempts: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.lock().clone()
    }

    pub fn is_active(&self) -> bool {
        *self.inner.state.lock() == SessionState::Active
    }

    /// The received video track, if any
    pub fn video_track(&self) -> Option<RemoteTrack> {
        self.inner.track.lock().clone()
    }

    /// Drain decoded frames and return the newest one, if any arrived
    ///
    /// Never blocks. Older frames in the same drain are skipped.
    pub fn poll_video_frame(&self) -> Option<Arc<VideoFrame>> {
        let newest = {
            let mut session = self.inner.session.lock();
            session.as_mut()?.frames.try_dequeue_all().pop()
        }?;

        let frame = Arc::new(newest);
        *self.inner.video.lock() = Some(Arc::clone(&frame));
        Some(frame)
    }

    /// Last frame returned by [`MediaSessionController::poll_video_frame`]
    ///
    /// Cleared when the session is stopped or fails.
    pub fn video_frame(&self) -> Option<Arc<VideoFrame>> {
        self.inner.video.lock().clone()
    }

    /// Number of `start_session` calls that began negotiating
    pub fn attempts(&self) -> u64 {
        self.inner.attempts.load(Ordering::Relaxed)
    }

    /// Negotiate a session against a WHEP endpoint
    ///
    /// Allowed from `Idle` or `Failed`. On failure the attempt is torn down,
    /// the state becomes `Failed`, and the error names the stage.
    pub async fn start_session(&self, endpoint: &str) -> Result<(), NegotiationError> {
        if self.inner.negotiating.swap(true, Ordering::AcqRel) {
            return Err(NegotiationError::Busy("negotiating".to_string()));
        }

        let current = self.state();
        if !current.can_start() {
            self.inner.negotiating.store(false, Ordering::Release);
            return Err(NegotiationError::Busy(current.to_string()));
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.attempts.fetch_add(1, Ordering::Relaxed);
        *self.inner.state.lock() = SessionState::Idle;

        let span = tracing::info_span!("media_session", id = %Uuid::new_v4(), endpoint = %endpoint);
        let result = self.negotiate(endpoint, generation).instrument(span).await;

        self.inner.negotiating.store(false, Ordering::Release);
        result
    }

    /// Spawn `start_session` on the current runtime
    ///
    /// The outcome is observable through [`MediaSessionController::state`].
    pub fn spawn_session(&self, endpoint: impl Into<String>) -> tokio::task::JoinHandle<()> {
        let controller = self.clone();
        let endpoint = endpoint.into();
        tokio::spawn(async move {
            // Failures are already logged and recorded in the state
            let _ = controller.start_session(&endpoint).await;
        })
    }

    /// Tear down the track, frames and peer connection and return to `Idle`
    pub async fn stop_session(&self) {
        {
            let _state = self.inner.state.lock();
            self.inner.generation.fetch_add(1, Ordering::AcqRel);
        }
        self.teardown().await;
        *self.inner.state.lock() = SessionState::Idle;
        tracing::info!("Media session stopped");
    }

    async fn negotiate(&self, endpoint: &str, generation: u64) -> Result<(), NegotiationError> {
        let peer = match self.inner.factory.create_peer(&self.inner.ice_servers).await {
            Ok(peer) => peer,
            Err(reason) => return self.fail(generation, NegotiationStage::CreatePeer, reason).await,
        };

        let (frame_sink, frames) = IngestQueue::new(DEFAULT_WARN_DEPTH);
        *self.inner.session.lock() = Some(LiveSession {
            peer: Arc::clone(&peer),
            resource_url: None,
            frames,
        });
        peer.on_video_frame(frame_sink);

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        peer.on_track(Box::new(move |track| {
            if let Some(inner) = weak.upgrade() {
                inner.on_track(track);
            }
        }));

        if let Err(reason) = peer.add_video_receiver().await {
            return self.fail(generation, NegotiationStage::AddTransceiver, reason).await;
        }

        let offer = match peer.create_offer().await {
            Ok(offer) => offer,
            Err(reason) => return self.fail(generation, NegotiationStage::CreateOffer, reason).await,
        };
        if !offer.contains(ICE_UFRAG_ATTR) {
            return self
                .fail(
                    generation,
                    NegotiationStage::CreateOffer,
                    "offer SDP missing ice-ufrag".to_string(),
                )
                .await;
        }
        tracing::debug!(offer_len = offer.len(), "Generated SDP offer");
        self.advance(generation, SessionState::OfferCreated).await?;

        let local = match peer.set_local_description(&offer).await {
            Ok(local) => local,
            Err(reason) => {
                return self
                    .fail(generation, NegotiationStage::SetLocalDescription, reason)
                    .await
            }
        };
        self.advance(generation, SessionState::LocalSet).await?;
        self.advance(generation, SessionState::AwaitingAnswer).await?;

        let answer = match self.inner.signaling.exchange(endpoint, &local).await {
            Ok(answer) => answer,
            Err(e) => {
                return self
                    .fail(generation, NegotiationStage::Signaling, e.to_string())
                    .await
            }
        };

        let stored = match self.inner.session.lock().as_mut() {
            Some(session) => {
                session.resource_url = answer.resource_url.clone();
                true
            }
            None => false,
        };
        if !stored {
            // Stopped while the POST was in flight; the resource is ours to release
            if let Some(url) = &answer.resource_url {
                if let Err(e) = self.inner.signaling.teardown(url).await {
                    tracing::warn!(resource = %url, error = %e, "Failed to release WHEP resource");
                }
            }
            return Err(NegotiationError::Cancelled);
        }

        if let Err(reason) = peer.set_remote_answer(&answer.sdp).await {
            return self.fail(generation, NegotiationStage::SetRemoteDescription, reason).await;
        }

        // A track may already have arrived while the answer was applied
        let next = if self.inner.track.lock().is_some() {
            SessionState::Active
        } else {
            SessionState::RemoteSet
        };
        self.advance(generation, next).await?;
        tracing::info!("Remote answer applied");
        Ok(())
    }

    /// Move to `next` unless the attempt was superseded by a stop
    async fn advance(&self, generation: u64, next: SessionState) -> Result<(), NegotiationError> {
        let label = next.to_string();
        if !self.inner.commit(generation, next) {
            tracing::debug!(state = %label, "Negotiation superseded");
            self.teardown().await;
            return Err(NegotiationError::Cancelled);
        }
        tracing::debug!(state = %label, "Session state");
        Ok(())
    }

    /// Record a failed stage unless the attempt was already stopped
    async fn fail(
        &self,
        generation: u64,
        stage: NegotiationStage,
        reason: String,
    ) -> Result<(), NegotiationError> {
        if self.inner.generation.load(Ordering::Acquire) != generation {
            tracing::debug!(stage = %stage, reason = %reason, "Stopped negotiation failed late");
            self.teardown().await;
            return Err(NegotiationError::Cancelled);
        }

        tracing::error!(stage = %stage, reason = %reason, "Media negotiation failed");
        self.teardown().await;

        let failed = SessionState::Failed {
            stage,
            reason: reason.clone(),
        };
        if !self.inner.commit(generation, failed) {
            return Err(NegotiationError::Cancelled);
        }
        Err(NegotiationError::Failed { stage, reason })
    }

    async fn teardown(&self) {
        *self.inner.track.lock() = None;
        *self.inner.video.lock() = None;

        let session = self.inner.session.lock().take();
        let Some(mut session) = session else {
            return;
        };
        session.frames.close();

        if let Err(e) = session.peer.close().await {
            tracing::warn!(error = %e, "Failed to close peer connection");
        }
        if let Some(url) = session.resource_url {
            if let Err(e) = self.inner.signaling.teardown(&url).await {
                tracing::warn!(resource = %url, error = %e, "Failed to release WHEP resource");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::media::whep::{SdpAnswer, SignalingError};
    use crate::socket::wait_for;
    use tokio::sync::oneshot;

    const GOOD_OFFER: &str = "v=0\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\na=ice-ufrag:abcd\r\na=recvonly\r\n";

    #[derive(Default)]
    struct PeerLog {
        calls: Vec<&'static str>,
        closed: bool,
    }

    pub(crate) struct MockPeer {
        offer: String,
        fail_at: Option<NegotiationStage>,
        log: Mutex<PeerLog>,
        track_cb: Mutex<Option<TrackCallback>>,
        frame_sink: Mutex<Option<VideoFrameSink>>,
    }

    impl MockPeer {
        fn check(&self, stage: NegotiationStage, call: &'static str) -> Result<(), String> {
            self.log.lock().calls.push(call);
            if self.fail_at == Some(stage) {
                Err(format!("{} refused", call))
            } else {
                Ok(())
            }
        }

        pub(crate) fn deliver_track(&self) {
            if let Some(cb) = self.track_cb.lock().as_ref() {
                cb(RemoteTrack {
                    id: "video0".to_string(),
                    kind: "video".to_string(),
                });
            }
        }

        /// Push a solid frame; false once the session has been torn down
        pub(crate) fn deliver_frame(&self, width: u32, height: u32, shade: u8) -> bool {
            let frame = VideoFrame {
                width,
                height,
                pixels: vec![shade; width as usize * height as usize * 3],
            };
            match self.frame_sink.lock().as_ref() {
                Some(sink) => sink.enqueue(frame),
                None => false,
            }
        }
    }

    #[async_trait]
    impl MediaPeer for MockPeer {
        fn on_track(&self, callback: TrackCallback) {
            *self.track_cb.lock() = Some(callback);
        }

        fn on_video_frame(&self, sink: VideoFrameSink) {
            *self.frame_sink.lock() = Some(sink);
        }

        async fn add_video_receiver(&self) -> Result<(), String> {
            self.check(NegotiationStage::AddTransceiver, "add_video_receiver")
        }

        async fn create_offer(&self) -> Result<String, String> {
            self.check(NegotiationStage::CreateOffer, "create_offer")?;
            Ok(self.offer.clone())
        }

        async fn set_local_description(&self, offer_sdp: &str) -> Result<String, String> {
            self.check(NegotiationStage::SetLocalDescription, "set_local")?;
            Ok(offer_sdp.to_string())
        }

        async fn set_remote_answer(&self, _answer_sdp: &str) -> Result<(), String> {
            self.check(NegotiationStage::SetRemoteDescription, "set_remote")
        }

        async fn close(&self) -> Result<(), String> {
            self.log.lock().closed = true;
            Ok(())
        }
    }

    pub(crate) struct MockFactory {
        offer: Mutex<String>,
        fail_at: Mutex<Option<NegotiationStage>>,
        peers: Mutex<Vec<Arc<MockPeer>>>,
    }

    impl MockFactory {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                offer: Mutex::new(GOOD_OFFER.to_string()),
                fail_at: Mutex::new(None),
                peers: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn last_peer(&self) -> Arc<MockPeer> {
            Arc::clone(self.peers.lock().last().unwrap())
        }
    }

    #[async_trait]
    impl PeerFactory for MockFactory {
        async fn create_peer(&self, ice_servers: &[String]) -> Result<Arc<dyn MediaPeer>, String> {
            if *self.fail_at.lock() == Some(NegotiationStage::CreatePeer) {
                return Err("no ICE servers".to_string());
            }
            assert!(!ice_servers.is_empty());
            let peer = Arc::new(MockPeer {
                offer: self.offer.lock().clone(),
                fail_at: *self.fail_at.lock(),
                log: Mutex::new(PeerLog::default()),
                track_cb: Mutex::new(None),
                frame_sink: Mutex::new(None),
            });
            self.peers.lock().push(Arc::clone(&peer));
            Ok(peer)
        }
    }

    #[derive(Default)]
    pub(crate) struct MockSignaling {
        fail: AtomicBool,
        offers: Mutex<Vec<String>>,
        teardowns: Mutex<Vec<String>>,
        gate: Mutex<Option<oneshot::Receiver<()>>>,
    }

    impl MockSignaling {
        /// Hold the next exchange until the returned sender fires
        fn hold_next_exchange(&self) -> oneshot::Sender<()> {
            let (release, gate) = oneshot::channel();
            *self.gate.lock() = Some(gate);
            release
        }
    }

    #[async_trait]
    impl SignalingChannel for MockSignaling {
        async fn exchange(&self, _endpoint: &str, offer_sdp: &str) -> Result<SdpAnswer, SignalingError> {
            self.offers.lock().push(offer_sdp.to_string());
            let gate = self.gate.lock().take();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(SignalingError::Status {
                    status: 500,
                    body: "internal".to_string(),
                });
            }
            Ok(SdpAnswer {
                sdp: "v=0\r\na=ice-ufrag:srv\r\n".to_string(),
                resource_url: Some("http://host/whep/1".to_string()),
            })
        }

        async fn teardown(&self, resource_url: &str) -> Result<(), SignalingError> {
            self.teardowns.lock().push(resource_url.to_string());
            Ok(())
        }
    }

    pub(crate) fn controller(
        factory: &Arc<MockFactory>,
        signaling: &Arc<MockSignaling>,
    ) -> MediaSessionController {
        MediaSessionController::new(
            factory.clone(),
            signaling.clone(),
            vec!["stun:stun.l.google.com:19302".to_string()],
        )
    }

    #[tokio::test]
    async fn test_happy_path_reaches_active_on_track() {
        let factory = MockFactory::new();
        let signaling = Arc::new(MockSignaling::default());
        let session = controller(&factory, &signaling);

        session.start_session("http://host/whep").await.unwrap();
        assert_eq!(session.state(), SessionState::RemoteSet);

        let peer = factory.last_peer();
        assert_eq!(
            peer.log.lock().calls,
            vec!["add_video_receiver", "create_offer", "set_local", "set_remote"]
        );
        assert_eq!(signaling.offers.lock()[0], GOOD_OFFER);

        peer.deliver_track();
        assert!(session.is_active());
        assert_eq!(session.video_track().unwrap().id, "video0");
    }

    #[tokio::test]
    async fn test_offer_without_ice_ufrag_fails_before_signaling() {
        let factory = MockFactory::new();
        *factory.offer.lock() = "v=0\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\n".to_string();
        let signaling = Arc::new(MockSignaling::default());
        let session = controller(&factory, &signaling);

        let err = session.start_session("http://host/whep").await.unwrap_err();
        assert_eq!(err.stage(), Some(NegotiationStage::CreateOffer));
        assert!(matches!(
            session.state(),
            SessionState::Failed { stage: NegotiationStage::CreateOffer, .. }
        ));
        assert!(signaling.offers.lock().is_empty());
        assert!(factory.last_peer().log.lock().closed);
    }

    #[tokio::test]
    async fn test_signaling_failure_does_not_retry() {
        let factory = MockFactory::new();
        let signaling = Arc::new(MockSignaling::default());
        signaling.fail.store(true, Ordering::SeqCst);
        let session = controller(&factory, &signaling);

        let err = session.start_session("http://host/whep").await.unwrap_err();
        assert_eq!(err.stage(), Some(NegotiationStage::Signaling));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(signaling.offers.lock().len(), 1);
        assert_eq!(session.attempts(), 1);

        // Caller-triggered retry from Failed
        signaling.fail.store(false, Ordering::SeqCst);
        session.start_session("http://host/whep").await.unwrap();
        assert_eq!(session.state(), SessionState::RemoteSet);
        assert_eq!(session.attempts(), 2);
    }

    #[tokio::test]
    async fn test_each_stage_failure_is_reported() {
        for stage in [
            NegotiationStage::CreatePeer,
            NegotiationStage::AddTransceiver,
            NegotiationStage::CreateOffer,
            NegotiationStage::SetLocalDescription,
            NegotiationStage::SetRemoteDescription,
        ] {
            let factory = MockFactory::new();
            *factory.fail_at.lock() = Some(stage);
            let signaling = Arc::new(MockSignaling::default());
            let session = controller(&factory, &signaling);

            let err = session.start_session("http://host/whep").await.unwrap_err();
            assert_eq!(err.stage(), Some(stage));
            assert!(session.video_track().is_none());
        }
    }

    #[tokio::test]
    async fn test_stop_releases_everything() {
        let factory = MockFactory::new();
        let signaling = Arc::new(MockSignaling::default());
        let session = controller(&factory, &signaling);

        session.start_session("http://host/whep").await.unwrap();
        factory.last_peer().deliver_track();
        assert!(session.is_active());

        session.stop_session().await;
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.video_track().is_none());
        assert!(factory.last_peer().log.lock().closed);
        assert_eq!(
            *signaling.teardowns.lock(),
            vec!["http://host/whep/1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_start_while_active_is_busy() {
        let factory = MockFactory::new();
        let signaling = Arc::new(MockSignaling::default());
        let session = controller(&factory, &signaling);

        session.start_session("http://host/whep").await.unwrap();
        assert!(matches!(
            session.start_session("http://host/whep").await,
            Err(NegotiationError::Busy(_))
        ));
        assert_eq!(factory.peers.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_spawned_session_reports_through_state() {
        let factory = MockFactory::new();
        let signaling = Arc::new(MockSignaling::default());
        let session = controller(&factory, &signaling);

        session.spawn_session("http://host/whep").await.unwrap();
        assert_eq!(session.state(), SessionState::RemoteSet);
    }

    #[tokio::test]
    async fn test_late_failure_after_stop_stays_idle() {
        let factory = MockFactory::new();
        let signaling = Arc::new(MockSignaling::default());
        let release = signaling.hold_next_exchange();
        let session = controller(&factory, &signaling);

        let handle = session.spawn_session("http://host/whep");
        wait_for(|| session.state() == SessionState::AwaitingAnswer).await;

        session.stop_session().await;
        assert_eq!(session.state(), SessionState::Idle);
        assert!(factory.last_peer().log.lock().closed);

        signaling.fail.store(true, Ordering::SeqCst);
        release.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(session.state(), SessionState::Idle);

        // The controller is free for a fresh attempt
        signaling.fail.store(false, Ordering::SeqCst);
        session.start_session("http://host/whep").await.unwrap();
        assert_eq!(session.state(), SessionState::RemoteSet);
    }

    #[tokio::test]
    async fn test_late_answer_after_stop_releases_resource() {
        let factory = MockFactory::new();
        let signaling = Arc::new(MockSignaling::default());
        let release = signaling.hold_next_exchange();
        let session = controller(&factory, &signaling);

        let handle = session.spawn_session("http://host/whep");
        wait_for(|| session.state() == SessionState::AwaitingAnswer).await;
        session.stop_session().await;

        release.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(
            *signaling.teardowns.lock(),
            vec!["http://host/whep/1".to_string()]
        );
        assert!(!factory.last_peer().log.lock().calls.contains(&"set_remote"));
    }

    #[tokio::test]
    async fn test_poll_returns_newest_frame() {
        let factory = MockFactory::new();
        let signaling = Arc::new(MockSignaling::default());
        let session = controller(&factory, &signaling);

        assert!(session.poll_video_frame().is_none());
        session.start_session("http://host/whep").await.unwrap();
        let peer = factory.last_peer();
        peer.deliver_track();

        assert!(peer.deliver_frame(4, 2, 10));
        assert!(peer.deliver_frame(8, 4, 20));
        let frame = session.poll_video_frame().unwrap();
        assert_eq!((frame.width, frame.height), (8, 4));
        assert_eq!(frame.pixels[0], 20);

        // Nothing new since the last poll; the current frame stays
        assert!(session.poll_video_frame().is_none());
        assert_eq!(session.video_frame().unwrap().width, 8);
    }

    #[tokio::test]
    async fn test_stop_releases_video_frames() {
        let factory = MockFactory::new();
        let signaling = Arc::new(MockSignaling::default());
        let session = controller(&factory, &signaling);

        session.start_session("http://host/whep").await.unwrap();
        let peer = factory.last_peer();
        peer.deliver_track();
        peer.deliver_frame(4, 4, 1);
        session.poll_video_frame().unwrap();
        peer.deliver_frame(4, 4, 2);

        session.stop_session().await;
        assert!(session.video_frame().is_none());
        assert!(session.poll_video_frame().is_none());

        // The old peer can no longer reach the consumer
        assert!(!peer.deliver_frame(4, 4, 3));
    }
}
