//! Frame texture
//!
//! Consumer-side sink for decoded frames. Each JPEG is decoded into an RGB8
//! pixel buffer that a renderer can upload as-is; the texture resizes itself
//! to whatever the last frame was. Frames from the WebRTC track arrive
//! already decoded and are copied in with [`FrameTexture::load_rgb`].

use chrono::{DateTime, Utc};
use image::ImageFormat;
use thiserror::Error;

use super::decoder::{DecodedFrame, FrameMeta};
use super::session::VideoFrame;

/// Placeholder size before the first frame arrives
pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;

#[derive(Error, Debug)]
pub enum TextureError {
    #[error("Failed to load JPEG image data: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Frame is {width}x{height} but carries {actual} bytes, expected {expected}")]
    PixelCount {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// RGB8 texture fed by the media channel
#[derive(Debug, Clone)]
pub struct FrameTexture {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    frames_loaded: u64,
    load_failures: u64,
    last_frame_at: Option<DateTime<Utc>>,
    last_meta: Option<FrameMeta>,
}

impl FrameTexture {
    pub fn new() -> Self {
        Self::with_size(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }

    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 3],
            frames_loaded: 0,
            load_failures: 0,
            last_frame_at: None,
            last_meta: None,
        }
    }

    /// Replace the contents with a decoded frame
    ///
    /// On failure the previous contents stay visible.
    pub fn load(&mut self, frame: &DecodedFrame) -> Result<(), TextureError> {
        let image = match image::load_from_memory_with_format(&frame.bytes, ImageFormat::Jpeg) {
            Ok(image) => image.to_rgb8(),
            Err(e) => {
                self.load_failures += 1;
                return Err(e.into());
            }
        };

        let (width, height) = image.dimensions();
        if (width, height) != (self.width, self.height) {
            tracing::debug!(width = width, height = height, "Texture resized");
        }

        self.width = width;
        self.height = height;
        self.pixels = image.into_raw();
        self.frames_loaded += 1;
        self.last_frame_at = Some(Utc::now());
        self.last_meta = frame.meta.clone();
        Ok(())
    }

    /// Replace the contents with an already decoded RGB8 frame
    pub fn load_rgb(&mut self, frame: &VideoFrame) -> Result<(), TextureError> {
        let expected = frame.width as usize * frame.height as usize * 3;
        if frame.pixels.len() != expected {
            self.load_failures += 1;
            return Err(TextureError::PixelCount {
                width: frame.width,
                height: frame.height,
                expected,
                actual: frame.pixels.len(),
            });
        }

        if (frame.width, frame.height) != (self.width, self.height) {
            tracing::debug!(width = frame.width, height = frame.height, "Texture resized");
        }

        self.width = frame.width;
        self.height = frame.height;
        self.pixels.clear();
        self.pixels.extend_from_slice(&frame.pixels);
        self.frames_loaded += 1;
        self.last_frame_at = Some(Utc::now());
        self.last_meta = None;
        Ok(())
    }

    /// Drop pixel data, keeping counters
    pub fn release(&mut self) {
        self.pixels = Vec::new();
        self.last_meta = None;
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Row-major RGB8 pixels
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn frames_loaded(&self) -> u64 {
        self.frames_loaded
    }

    pub fn load_failures(&self) -> u64 {
        self.load_failures
    }

    pub fn last_frame_at(&self) -> Option<DateTime<Utc>> {
        self.last_frame_at
    }

    pub fn last_meta(&self) -> Option<&FrameMeta> {
        self.last_meta.as_ref()
    }
}

impl Default for FrameTexture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bytes::Bytes;
    use image::{DynamicImage, RgbImage};
    use std::io::Cursor;

    pub(crate) fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, image::Rgb([200, 40, 40]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
            .unwrap();
        buf
    }

    #[test]
    fn test_starts_at_default_size() {
        let texture = FrameTexture::new();
        assert_eq!(texture.dimensions(), (1280, 720));
        assert_eq!(texture.pixels().len(), 1280 * 720 * 3);
    }

    #[test]
    fn test_load_resizes_to_frame() {
        let mut texture = FrameTexture::new();
        let frame = DecodedFrame {
            bytes: Bytes::from(jpeg_bytes(32, 16)),
            meta: None,
        };

        texture.load(&frame).unwrap();
        assert_eq!(texture.dimensions(), (32, 16));
        assert_eq!(texture.pixels().len(), 32 * 16 * 3);
        assert_eq!(texture.frames_loaded(), 1);
        assert!(texture.last_frame_at().is_some());
    }

    #[test]
    fn test_bad_jpeg_keeps_previous_contents() {
        let mut texture = FrameTexture::with_size(4, 4);
        let frame = DecodedFrame {
            bytes: Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xE0]),
            meta: None,
        };

        assert!(texture.load(&frame).is_err());
        assert_eq!(texture.dimensions(), (4, 4));
        assert_eq!(texture.load_failures(), 1);
        assert_eq!(texture.frames_loaded(), 0);
    }

    #[test]
    fn test_load_rgb_copies_video_frame() {
        let mut texture = FrameTexture::new();
        let frame = VideoFrame {
            width: 4,
            height: 2,
            pixels: vec![7; 4 * 2 * 3],
        };

        texture.load_rgb(&frame).unwrap();
        assert_eq!(texture.dimensions(), (4, 2));
        assert_eq!(texture.pixels(), &frame.pixels[..]);
        assert!(texture.last_meta().is_none());
    }

    #[test]
    fn test_load_rgb_rejects_short_buffer() {
        let mut texture = FrameTexture::with_size(2, 2);
        let frame = VideoFrame {
            width: 4,
            height: 4,
            pixels: vec![0; 10],
        };

        assert!(matches!(
            texture.load_rgb(&frame),
            Err(TextureError::PixelCount { expected: 48, actual: 10, .. })
        ));
        assert_eq!(texture.dimensions(), (2, 2));
        assert_eq!(texture.load_failures(), 1);
    }
}
