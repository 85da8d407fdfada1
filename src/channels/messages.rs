//! Side-channel wire messages
//!
//! Outbound: per-frame detection metadata. Inbound: live configuration
//! updates from the viewer. Both are JSON text over the peer's data channel.

use crate::detect::Detection;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Per-frame metadata published on the side channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameStats {
    /// Capture wall-clock time, ISO-8601 UTC with millisecond precision
    pub ts: String,
    /// Smoothed processing rate, frames per second
    pub fps: f64,
    /// Frame width at detection time, pixels
    pub img_w: u32,
    /// Frame height at detection time, pixels
    pub img_h: u32,
    /// Monotonic frame counter, starts at 1
    pub frame_id: u64,
    /// Detections drawn on this frame
    pub detections: Vec<Detection>,
}

impl FrameStats {
    /// Build stats for the current instant.
    pub fn now(fps: f64, img_w: u32, img_h: u32, frame_id: u64, detections: Vec<Detection>) -> Self {
        Self {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            fps,
            img_w,
            img_h,
            frame_id,
            detections,
        }
    }
}

/// Inbound config update: `{"conf": 0.4}`
#[derive(Debug, Deserialize)]
struct ConfigUpdate {
    conf: f32,
}

/// Parse an inbound side-channel payload into a threshold update.
///
/// Anything that is not a JSON object with a numeric `conf` field yields
/// `None`; the caller logs and ignores it.
pub fn parse_config_update(payload: &[u8]) -> Option<f32> {
    serde_json::from_slice::<ConfigUpdate>(payload)
        .ok()
        .map(|u| u.conf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_stats_wire_shape() {
        let stats = FrameStats::now(12.5, 1280, 720, 42, Vec::new());
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["fps"], 12.5);
        assert_eq!(json["img_w"], 1280);
        assert_eq!(json["img_h"], 720);
        assert_eq!(json["frame_id"], 42);
        assert!(json["detections"].as_array().unwrap().is_empty());
        // ISO-8601 UTC with millisecond precision, e.g. 2026-08-30T12:00:00.123Z
        let ts = json["ts"].as_str().unwrap();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2026-08-30T12:00:00.123Z".len());
    }

    #[test]
    fn test_parse_config_update() {
        assert_eq!(parse_config_update(br#"{"conf": 0.4}"#), Some(0.4));
        assert_eq!(parse_config_update(br#"{"conf": 0.4, "extra": 1}"#), Some(0.4));
    }

    #[test]
    fn test_parse_config_update_rejects_garbage() {
        assert_eq!(parse_config_update(b"not json"), None);
        assert_eq!(parse_config_update(br#"{"threshold": 0.4}"#), None);
        assert_eq!(parse_config_update(br#"{"conf": "high"}"#), None);
        assert_eq!(parse_config_update(b""), None);
    }
}
