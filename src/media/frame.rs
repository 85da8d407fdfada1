//! Video frame type and source/sink seams
//!
//! The pipeline only ever sees [`VideoFrame`]s flowing through a
//! [`FrameSource`] and a [`FrameSink`]. The WebRTC track adapters implement
//! these; tests substitute in-memory fakes.

use crate::Result;
use async_trait::async_trait;
use image::{imageops::FilterType, RgbImage};

/// A decoded video frame with its presentation timing.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Decoded pixels, RGB
    pub image: RgbImage,
    /// Presentation timestamp in `time_base` units
    pub pts: i64,
    /// Timestamp units as (numerator, denominator), e.g. (1, 90000) for RTP
    pub time_base: (u32, u32),
}

impl VideoFrame {
    /// Frame width in pixels
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Frame height in pixels
    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Ordered stream of inbound frames.
///
/// `next_frame` returns `Ok(None)` when the stream ended cleanly and an
/// error when the transport failed.
#[async_trait]
pub trait FrameSource: Send {
    async fn next_frame(&mut self) -> Result<Option<VideoFrame>>;
}

/// Destination for annotated outbound frames.
#[async_trait]
pub trait FrameSink: Send {
    async fn send_frame(&mut self, frame: VideoFrame) -> Result<()>;
}

/// Upscale an image to at least `min_height` pixels tall, preserving aspect
/// ratio. Frames already at or above the floor are returned untouched;
/// this never downscales.
pub fn ensure_min_height(image: RgbImage, min_height: u32) -> RgbImage {
    let (w, h) = (image.width(), image.height());
    if h >= min_height || h == 0 {
        return image;
    }
    let scale = min_height as f64 / h as f64;
    let new_w = ((w as f64 * scale).round() as u32).max(1);
    image::imageops::resize(&image, new_w, min_height, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_height_upscales_small_frames() {
        let img = RgbImage::new(640, 480);
        let out = ensure_min_height(img, 720);
        assert_eq!(out.height(), 720);
        assert_eq!(out.width(), 960);
    }

    #[test]
    fn test_min_height_leaves_tall_frames_alone() {
        let img = RgbImage::new(1920, 1080);
        let out = ensure_min_height(img, 720);
        assert_eq!((out.width(), out.height()), (1920, 1080));
    }

    #[test]
    fn test_min_height_exact_floor_untouched() {
        let img = RgbImage::new(1280, 720);
        let out = ensure_min_height(img, 720);
        assert_eq!((out.width(), out.height()), (1280, 720));
    }

    #[test]
    fn test_min_height_preserves_aspect_ratio() {
        let img = RgbImage::new(320, 180);
        let out = ensure_min_height(img, 720);
        assert_eq!(out.height(), 720);
        assert_eq!(out.width(), 1280);
    }
}
