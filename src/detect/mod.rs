//! Inference boundary
//!
//! The detection model is an external capability with a narrow contract:
//! given a frame and a confidence threshold it returns the detections that
//! survived the threshold. Everything model-specific (weights, input size,
//! execution provider) lives behind [`InferenceEngine`]; the streaming
//! pipeline and the REST endpoint only see this trait.

#[cfg(feature = "onnx")]
mod onnx;

#[cfg(feature = "onnx")]
pub use onnx::OnnxYoloEngine;

use crate::{Error, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A single detection as produced by an engine, in pixel coordinates of the
/// frame it was run against (xyxy corners).
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    /// Class label
    pub label: String,
    /// Confidence score in [0, 1]
    pub confidence: f32,
    /// Left edge, pixels
    pub x1: f32,
    /// Top edge, pixels
    pub y1: f32,
    /// Right edge, pixels
    pub x2: f32,
    /// Bottom edge, pixels
    pub y2: f32,
}

/// Wire-shaped detection: xywh in pixels plus the same box normalized by
/// frame size. Produced fresh per frame, never mutated afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Class label
    pub cls: String,
    /// Confidence score in [0, 1]
    pub conf: f32,
    /// [x, y, w, h] in pixels
    pub bbox_xywh: [f32; 4],
    /// [x, y, w, h] normalized by frame width/height, each in [0, 1]
    pub bbox_xywh_norm: [f32; 4],
}

impl Detection {
    /// Build a wire detection from a raw one against a frame of the given
    /// size. Coordinates are clamped to the frame so normalized components
    /// always land in [0, 1].
    pub fn from_raw(raw: &RawDetection, frame_w: u32, frame_h: u32) -> Self {
        let fw = frame_w as f32;
        let fh = frame_h as f32;
        let x1 = raw.x1.clamp(0.0, fw);
        let y1 = raw.y1.clamp(0.0, fh);
        let x2 = raw.x2.clamp(0.0, fw);
        let y2 = raw.y2.clamp(0.0, fh);
        let (w, h) = ((x2 - x1).max(0.0), (y2 - y1).max(0.0));
        Self {
            cls: raw.label.clone(),
            conf: raw.confidence,
            bbox_xywh: [x1, y1, w, h],
            bbox_xywh_norm: [x1 / fw, y1 / fh, w / fw, h / fh],
        }
    }

    /// Severity tier derived from the confidence score
    pub fn tier(&self) -> SeverityTier {
        SeverityTier::from_confidence(self.conf)
    }
}

/// Coarse confidence bucket driving overlay color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeverityTier {
    /// confidence >= 0.90
    Critical,
    /// 0.75 <= confidence < 0.90
    Warning,
    /// confidence < 0.75
    Normal,
}

impl SeverityTier {
    /// Map a confidence score to its tier
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence >= 0.90 {
            SeverityTier::Critical
        } else if confidence >= 0.75 {
            SeverityTier::Warning
        } else {
            SeverityTier::Normal
        }
    }

    /// Overlay color for this tier (RGB)
    pub fn color(&self) -> [u8; 3] {
        match self {
            SeverityTier::Critical => [255, 59, 0],
            SeverityTier::Warning => [255, 204, 0],
            SeverityTier::Normal => [0, 123, 255],
        }
    }
}

/// External inference capability.
///
/// Implementations are shared read-only across all pipelines and must be
/// safe to invoke concurrently from blocking worker threads. Calls are
/// synchronous and CPU/GPU-bound; callers offload them off the event loop.
pub trait InferenceEngine: Send + Sync {
    /// Run detection on an RGB frame. Only detections at or above
    /// `threshold` are returned. `input_size` is an optional per-call
    /// model input size hint (REST `imgsz`); engines without a resize knob
    /// may ignore it.
    fn infer(
        &self,
        image: &RgbImage,
        threshold: f32,
        input_size: Option<u32>,
    ) -> Result<Vec<RawDetection>>;

    /// Whether the engine finished initializing and can serve requests
    fn is_ready(&self) -> bool;

    /// Whether the engine runs on a GPU execution provider
    fn uses_gpu(&self) -> bool {
        false
    }

    /// Model name reported in REST responses
    fn model_name(&self) -> &str;
}

/// Shared engine handle
pub type SharedEngine = Arc<dyn InferenceEngine>;

/// Engine used when no model is configured. Never ready; every inference
/// fails fast with `ModelUnavailable`. The stream keeps flowing
/// unannotated and `/v1/detect` answers 503.
pub struct DisabledEngine;

impl InferenceEngine for DisabledEngine {
    fn infer(
        &self,
        _image: &RgbImage,
        _threshold: f32,
        _input_size: Option<u32>,
    ) -> Result<Vec<RawDetection>> {
        Err(Error::ModelUnavailable("no model configured".to_string()))
    }

    fn is_ready(&self) -> bool {
        false
    }

    fn model_name(&self) -> &str {
        "none"
    }
}
