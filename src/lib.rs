//! Real-time object-detection overlay for WebRTC video streams.
//!
//! A browser posts an SDP offer to `/webrtc/offer` and sends its camera
//! track; the service decodes each frame, runs a detection model, burns
//! boxes and labels into the pixels, and returns the annotated video on a
//! second track in the same connection. Per-frame detection metadata flows
//! over the peer's data channel, which also accepts live confidence
//! threshold updates. A small REST surface serves health probes and
//! one-shot detection on uploaded images.
//!
//! # Architecture
//!
//! - [`session`]: handshake, session registry, and per-peer state
//! - [`pipeline`]: the per-connection frame loop (decode, detect, draw,
//!   re-encode), strictly in order with one frame in flight
//! - [`detect`]: the [`detect::InferenceEngine`] seam and the ONNX YOLO
//!   engine behind the `onnx` feature
//! - [`annotate`]: overlay drawing on RGB buffers
//! - [`media`]: frame types, H.264 codecs (`h264` feature), and WebRTC
//!   track adapters
//! - [`channels`]: data-channel wire shapes and best-effort publishing
//! - [`http`]: axum router for signaling, probes, and `/v1/detect`

pub mod annotate;
pub mod channels;
pub mod config;
pub mod detect;
pub mod error;
pub mod http;
pub mod media;
pub mod pipeline;
pub mod session;

pub use config::ServiceConfig;
pub use error::{Error, Result};
pub use pipeline::{AnnotationPipeline, PipelineHandle, PipelineState};
pub use session::{SessionManager, ThresholdCell};

/// Crate version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::version().is_empty());
    }
}
