//! Frame decoding
//!
//! Inbound media messages are either a JSON envelope
//! `{"type":"rgb_image","data":<base64 JPEG>,"timestamp":..,"width":..,"height":..,"frame_id":..}`
//! or a bare base64 string. Both decode to a [`DecodedFrame`].
//!
//! Only `type` and `data` are load-bearing. The metadata fields are read
//! leniently: numbers may arrive as floats or strings and `frame_id` may be
//! numeric. Anything unusable becomes the default instead of rejecting the
//! frame.

use std::sync::atomic::{AtomicU64, Ordering};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::ingest::IngestProducer;
use crate::socket::SocketHandler;

/// Envelope type tag for JPEG frames
pub const RGB_IMAGE_TYPE: &str = "rgb_image";

const PREVIEW_CHARS: usize = 50;

/// Frame decoding failures
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("Message does not match expected format: {preview}...")]
    UnrecognizedFormat { preview: String },
}

impl DecodeError {
    fn unrecognized(raw: &str) -> Self {
        DecodeError::UnrecognizedFormat {
            preview: raw.chars().take(PREVIEW_CHARS).collect(),
        }
    }
}

/// Structured frame message as sent by the sensing host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameEnvelope {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub timestamp: f64,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub width: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub height: u32,
    #[serde(default, deserialize_with = "lenient_id")]
    pub frame_id: Option<String>,
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0.0,
    })
}

fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = lenient_f64(deserializer)?;
    if (0.0..=f64::from(u32::MAX)).contains(&value) {
        Ok(value.round() as u32)
    } else {
        Ok(0)
    }
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

impl FrameEnvelope {
    /// Envelope wrapping already-encoded image bytes
    pub fn rgb_image(jpeg: &[u8], width: u32, height: u32) -> Self {
        Self {
            kind: Some(RGB_IMAGE_TYPE.to_string()),
            data: Some(BASE64.encode(jpeg)),
            timestamp: 0.0,
            width,
            height,
            frame_id: None,
        }
    }
}

/// Metadata carried by an envelope
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMeta {
    pub timestamp: f64,
    pub width: u32,
    pub height: u32,
    pub frame_id: Option<String>,
}

/// Compressed image bytes ready for the consumer
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub bytes: Bytes,
    /// `None` for bare base64 messages
    pub meta: Option<FrameMeta>,
}

/// Turns inbound text messages into frames
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDecoder;

impl FrameDecoder {
    pub fn new() -> Self {
        Self
    }

    pub fn decode(&self, raw: &str) -> Result<DecodedFrame, DecodeError> {
        match serde_json::from_str::<FrameEnvelope>(raw) {
            Ok(envelope) => Self::decode_envelope(envelope, raw),
            Err(_) if is_bare_base64(raw) => {
                let bytes = BASE64.decode(raw)?;
                tracing::trace!(size = bytes.len(), "Decoded bare base64 frame");
                Ok(DecodedFrame {
                    bytes: Bytes::from(bytes),
                    meta: None,
                })
            }
            Err(_) => Err(DecodeError::unrecognized(raw)),
        }
    }

    fn decode_envelope(envelope: FrameEnvelope, raw: &str) -> Result<DecodedFrame, DecodeError> {
        let data = match (envelope.kind.as_deref(), envelope.data.as_deref()) {
            (Some(RGB_IMAGE_TYPE), Some(data)) if !data.is_empty() => data,
            _ => return Err(DecodeError::unrecognized(raw)),
        };

        let bytes = BASE64.decode(data)?;
        tracing::trace!(
            size = bytes.len(),
            width = envelope.width,
            height = envelope.height,
            "Decoded frame envelope"
        );

        Ok(DecodedFrame {
            bytes: Bytes::from(bytes),
            meta: Some(FrameMeta {
                timestamp: envelope.timestamp,
                width: envelope.width,
                height: envelope.height,
                frame_id: envelope.frame_id,
            }),
        })
    }
}

/// Non-empty, length a multiple of four, and decodable
fn is_bare_base64(raw: &str) -> bool {
    !raw.is_empty() && raw.len() % 4 == 0 && BASE64.decode(raw).is_ok()
}

/// Socket handler for the media channel
///
/// Decodes on the network task and pushes frames into the ingest queue.
/// Decode failures are logged and counted; the connection keeps reading.
pub struct FrameIngestHandler {
    decoder: FrameDecoder,
    producer: IngestProducer<DecodedFrame>,
    decoded: AtomicU64,
    rejected: AtomicU64,
}

impl FrameIngestHandler {
    pub fn new(producer: IngestProducer<DecodedFrame>) -> Self {
        Self {
            decoder: FrameDecoder::new(),
            producer,
            decoded: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// (decoded, rejected) message counts
    pub fn counts(&self) -> (u64, u64) {
        (
            self.decoded.load(Ordering::Relaxed),
            self.rejected.load(Ordering::Relaxed),
        )
    }
}

impl SocketHandler for FrameIngestHandler {
    fn on_open(&self) {
        tracing::info!("Media channel opened");
    }

    fn on_message(&self, text: &str) {
        match self.decoder.decode(text) {
            Ok(frame) => {
                let size = frame.bytes.len();
                if self.producer.enqueue(frame) {
                    self.decoded.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(size = size, "Frame enqueued");
                }
            }
            Err(e) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                match e {
                    DecodeError::UnrecognizedFormat { .. } => {
                        tracing::warn!(error = %e, "Ignoring media message")
                    }
                    DecodeError::InvalidBase64(_) => {
                        tracing::error!(error = %e, "Failed to process media message")
                    }
                }
            }
        }
    }

    fn on_close(&self, reason: &str) {
        tracing::info!(reason = %reason, "Media channel closed");
    }

    fn on_error(&self, message: &str) {
        tracing::error!(error = %message, "Media channel error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{IngestQueue, DEFAULT_WARN_DEPTH};
    use proptest::prelude::*;

    const JPEG_MAGIC: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xE0];

    #[test]
    fn test_envelope_decodes_with_meta() {
        let raw = r#"{"type":"rgb_image","data":"/9j/4A==","timestamp":1.5,"width":640,"height":480,"frame_id":"cam0"}"#;
        let frame = FrameDecoder::new().decode(raw).unwrap();

        assert_eq!(&frame.bytes[..], &JPEG_MAGIC);
        let meta = frame.meta.unwrap();
        assert_eq!(meta.width, 640);
        assert_eq!(meta.height, 480);
        assert_eq!(meta.timestamp, 1.5);
        assert_eq!(meta.frame_id.as_deref(), Some("cam0"));
    }

    #[test]
    fn test_loose_metadata_still_decodes() {
        let raw = r#"{"type":"rgb_image","data":"/9j/4A==","timestamp":"2.25","width":640.0,"height":"480","frame_id":17}"#;
        let frame = FrameDecoder::new().decode(raw).unwrap();

        assert_eq!(&frame.bytes[..], &JPEG_MAGIC);
        let meta = frame.meta.unwrap();
        assert_eq!((meta.width, meta.height), (640, 480));
        assert_eq!(meta.timestamp, 2.25);
        assert_eq!(meta.frame_id.as_deref(), Some("17"));
    }

    #[test]
    fn test_unusable_metadata_falls_back_to_defaults() {
        let raw = r#"{"type":"rgb_image","data":"/9j/4A==","timestamp":null,"width":-3,"height":{"px":480},"frame_id":[1]}"#;
        let meta = FrameDecoder::new().decode(raw).unwrap().meta.unwrap();

        assert_eq!((meta.width, meta.height), (0, 0));
        assert_eq!(meta.timestamp, 0.0);
        assert!(meta.frame_id.is_none());
    }

    #[test]
    fn test_other_type_is_unrecognized() {
        let raw = r#"{"type":"other","data":"/9j/4A=="}"#;
        let err = FrameDecoder::new().decode(raw).unwrap_err();
        assert!(matches!(err, DecodeError::UnrecognizedFormat { .. }));
    }

    #[test]
    fn test_empty_data_is_unrecognized() {
        let raw = r#"{"type":"rgb_image","data":""}"#;
        assert!(matches!(
            FrameDecoder::new().decode(raw),
            Err(DecodeError::UnrecognizedFormat { .. })
        ));
    }

    #[test]
    fn test_envelope_with_bad_base64() {
        let raw = r#"{"type":"rgb_image","data":"not*base64"}"#;
        assert!(matches!(
            FrameDecoder::new().decode(raw),
            Err(DecodeError::InvalidBase64(_))
        ));
    }

    #[test]
    fn test_bare_base64_has_no_meta() {
        let frame = FrameDecoder::new().decode("/9j/4A==").unwrap();
        assert_eq!(&frame.bytes[..], &JPEG_MAGIC);
        assert!(frame.meta.is_none());
    }

    #[test]
    fn test_garbage_is_unrecognized() {
        let decoder = FrameDecoder::new();
        for raw in ["", "abc", "hello world!", "{not json"] {
            assert!(
                matches!(decoder.decode(raw), Err(DecodeError::UnrecognizedFormat { .. })),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_preview_is_truncated() {
        let raw = format!("{{\"type\":\"other\",\"pad\":\"{}\"}}", "x".repeat(200));
        match FrameDecoder::new().decode(&raw) {
            Err(DecodeError::UnrecognizedFormat { preview }) => {
                assert_eq!(preview.chars().count(), PREVIEW_CHARS)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_handler_enqueues_frames_only() {
        let (producer, mut queue) = IngestQueue::new(DEFAULT_WARN_DEPTH);
        let handler = FrameIngestHandler::new(producer);

        handler.on_message("/9j/4A==");
        handler.on_message(r#"{"type":"other"}"#);
        handler.on_message(r#"{"type":"rgb_image","data":"/9j/4A=="}"#);

        let frames = queue.try_dequeue_all();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].meta.is_none());
        assert!(frames[1].meta.is_some());
        assert_eq!(handler.counts(), (2, 1));
    }

    proptest! {
        #[test]
        fn prop_bare_base64_round_trip(bytes in prop::collection::vec(any::<u8>(), 1..512)) {
            let encoded = BASE64.encode(&bytes);
            let frame = FrameDecoder::new().decode(&encoded).unwrap();
            prop_assert_eq!(&frame.bytes[..], &bytes[..]);
            prop_assert!(frame.meta.is_none());
        }
    }
}
