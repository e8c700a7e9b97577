//! webrtc-rs peer connections
//!
//! [`PeerFactory`] backed by the `webrtc` crate. Offers are returned only
//! after ICE gathering completes, since WHEP does not trickle candidates.
//!
//! Only H.264 is offered. RTP from the remote track is reassembled into
//! access units with a `SampleBuilder` and decoded to RGB8 by openh264 on a
//! dedicated thread, then pushed into the session's frame queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use openh264::decoder::Decoder;
use openh264::formats::YUVSource;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_H264};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::io::sample_builder::SampleBuilder;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp::codecs::h264::H264Packet;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCPFeedback, RTCRtpTransceiverInit};
use webrtc::track::track_remote::TrackRemote;

use super::session::{MediaPeer, PeerFactory, RemoteTrack, TrackCallback, VideoFrame, VideoFrameSink};

const H264_CLOCK_RATE: u32 = 90_000;
const H264_PAYLOAD_TYPE: u8 = 102;
const H264_FMTP: &str = "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f";

/// Packets a sample may lag before the builder gives up on it
const MAX_LATE_PACKETS: u16 = 256;

/// Creates webrtc-rs peer connections with an H.264-only media engine
#[derive(Debug, Clone, Copy, Default)]
pub struct RtcPeerFactory;

fn h264_codec() -> RTCRtpCodecParameters {
    let feedback = |typ: &str, parameter: &str| RTCPFeedback {
        typ: typ.to_owned(),
        parameter: parameter.to_owned(),
    };

    RTCRtpCodecParameters {
        capability: RTCRtpCodecCapability {
            mime_type: MIME_TYPE_H264.to_owned(),
            clock_rate: H264_CLOCK_RATE,
            channels: 0,
            sdp_fmtp_line: H264_FMTP.to_owned(),
            rtcp_feedback: vec![feedback("nack", ""), feedback("nack", "pli")],
        },
        payload_type: H264_PAYLOAD_TYPE,
        ..Default::default()
    }
}

#[async_trait]
impl PeerFactory for RtcPeerFactory {
    async fn create_peer(&self, ice_servers: &[String]) -> Result<Arc<dyn MediaPeer>, String> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_codec(h264_codec(), RTPCodecType::Video)
            .map_err(|e| format!("Failed to register H.264: {}", e))?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| format!("Failed to register interceptors: {}", e))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: ice_servers.to_vec(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let pc = api
            .new_peer_connection(config)
            .await
            .map_err(|e| format!("Failed to create peer connection: {}", e))?;

        pc.on_ice_connection_state_change(Box::new(|state| {
            tracing::info!(state = %state, "ICE connection state");
            Box::pin(async {})
        }));

        Ok(Arc::new(RtcPeer {
            pc: Arc::new(pc),
            rtp_packets: Arc::new(AtomicU64::new(0)),
            frame_sink: Arc::new(Mutex::new(None)),
        }))
    }
}

/// One webrtc-rs peer connection
pub struct RtcPeer {
    pc: Arc<RTCPeerConnection>,
    rtp_packets: Arc<AtomicU64>,
    frame_sink: Arc<Mutex<Option<VideoFrameSink>>>,
}

impl RtcPeer {
    /// RTP packets read from remote tracks so far
    pub fn rtp_packets(&self) -> u64 {
        self.rtp_packets.load(Ordering::Relaxed)
    }
}

/// Read RTP until the track ends, handing complete samples to the decoder
///
/// Reading also keeps the interceptors (NACK, RTCP reports) serviced.
async fn read_track(track: Arc<TrackRemote>, counter: Arc<AtomicU64>, sink: Option<VideoFrameSink>) {
    let track_id = track.id();
    let mut samples = sink.map(|sink| spawn_decoder(track_id.clone(), sink));
    let mut builder = SampleBuilder::new(MAX_LATE_PACKETS, H264Packet::default(), H264_CLOCK_RATE);

    while let Ok((packet, _)) = track.read_rtp().await {
        counter.fetch_add(1, Ordering::Relaxed);

        let Some(tx) = samples.as_ref() else {
            continue;
        };
        builder.push(packet);

        let mut decoder_gone = false;
        while let Some(sample) = builder.pop() {
            if tx.send(sample.data.to_vec()).is_err() {
                decoder_gone = true;
                break;
            }
        }
        if decoder_gone {
            tracing::debug!(track_id = %track_id, "Decoder gone; reading without decoding");
            samples = None;
        }
    }
    tracing::debug!(track_id = %track_id, "Remote track ended");
}

/// Start the decoder thread and return its sample channel
///
/// openh264 decoders are not `Send`, so each lives on its own thread and
/// exits when the channel closes or the frame queue stops accepting.
fn spawn_decoder(track_id: String, sink: VideoFrameSink) -> mpsc::UnboundedSender<Vec<u8>> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let spawned = std::thread::Builder::new()
        .name("h264-decode".to_string())
        .spawn(move || {
            let mut decoder = match Decoder::new() {
                Ok(decoder) => decoder,
                Err(e) => {
                    tracing::error!(track_id = %track_id, error = %e, "Failed to create H.264 decoder");
                    return;
                }
            };

            let mut decoded = 0u64;
            while let Some(sample) = rx.blocking_recv() {
                let yuv = match decoder.decode(&sample) {
                    Ok(Some(yuv)) => yuv,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::debug!(track_id = %track_id, error = %e, "Dropping undecodable sample");
                        continue;
                    }
                };

                let (width, height) = yuv.dimensions();
                let mut pixels = vec![0; width * height * 3];
                yuv.write_rgb8(&mut pixels);

                let frame = VideoFrame {
                    width: width as u32,
                    height: height as u32,
                    pixels,
                };
                if !sink.enqueue(frame) {
                    break;
                }
                decoded += 1;
            }
            tracing::debug!(track_id = %track_id, decoded = decoded, "Decoder stopped");
        });

    if let Err(e) = spawned {
        tracing::error!(error = %e, "Failed to spawn decoder thread");
    }
    tx
}

#[async_trait]
impl MediaPeer for RtcPeer {
    fn on_track(&self, callback: TrackCallback) {
        let callback = Arc::new(callback);
        let counter = Arc::clone(&self.rtp_packets);
        let frame_sink = Arc::clone(&self.frame_sink);

        self.pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            callback(RemoteTrack {
                id: track.id(),
                kind: track.kind().to_string(),
            });
            let counter = Arc::clone(&counter);
            let sink = frame_sink.lock().clone();
            Box::pin(async move {
                tokio::spawn(read_track(track, counter, sink));
            })
        }));
    }

    fn on_video_frame(&self, sink: VideoFrameSink) {
        *self.frame_sink.lock() = Some(sink);
    }

    async fn add_video_receiver(&self) -> Result<(), String> {
        self.pc
            .add_transceiver_from_kind(
                RTPCodecType::Video,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await
            .map(|_| ())
            .map_err(|e| format!("Failed to add transceiver: {}", e))
    }

    async fn create_offer(&self) -> Result<String, String> {
        self.pc
            .create_offer(None)
            .await
            .map(|offer| offer.sdp)
            .map_err(|e| format!("Failed to create offer: {}", e))
    }

    async fn set_local_description(&self, offer_sdp: &str) -> Result<String, String> {
        let offer = RTCSessionDescription::offer(offer_sdp.to_string())
            .map_err(|e| format!("Invalid SDP offer: {}", e))?;

        let mut gathered = self.pc.gathering_complete_promise().await;
        self.pc
            .set_local_description(offer)
            .await
            .map_err(|e| format!("Failed to set local description: {}", e))?;
        let _ = gathered.recv().await;

        self.pc
            .local_description()
            .await
            .map(|desc| desc.sdp)
            .ok_or_else(|| "Local description missing after ICE gathering".to_string())
    }

    async fn set_remote_answer(&self, answer_sdp: &str) -> Result<(), String> {
        let answer = RTCSessionDescription::answer(answer_sdp.to_string())
            .map_err(|e| format!("Invalid SDP answer: {}", e))?;
        self.pc
            .set_remote_description(answer)
            .await
            .map_err(|e| format!("Failed to set remote description: {}", e))
    }

    async fn close(&self) -> Result<(), String> {
        *self.frame_sink.lock() = None;
        self.pc
            .close()
            .await
            .map_err(|e| format!("Failed to close peer connection: {}", e))
    }
}
