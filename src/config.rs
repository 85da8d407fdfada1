//! Configuration types for the annotation service

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for the service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// HTTP bind address (signaling + REST), e.g. "0.0.0.0:8080"
    pub bind_address: String,

    /// STUN server URLs
    pub stun_servers: Vec<String>,

    /// Path to the detection model (onnx feature)
    pub model_path: Option<String>,

    /// Default confidence threshold for single-image detection
    pub default_rest_threshold: f32,

    /// Default confidence threshold for streaming sessions when the offer
    /// does not carry one
    pub default_stream_threshold: f32,

    /// Minimum output frame height in pixels; lower frames are upscaled,
    /// never downscaled
    pub min_output_height: u32,

    /// Fixed interval between ICE gathering state polls, milliseconds
    pub ice_poll_interval_ms: u64,

    /// Upper bound on the ICE gathering wait, milliseconds. The handshake
    /// fails with a signaling error when exceeded.
    pub ice_gather_timeout_ms: u64,

    /// Maximum number of concurrent sessions
    pub max_sessions: usize,

    /// Publish metadata for frames with zero detections. Off by default:
    /// the side channel carries a message only when at least one detection
    /// survived the threshold.
    pub publish_empty_detections: bool,
}

impl ServiceConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.bind_address.is_empty() {
            return Err(Error::InvalidConfig("bind_address is empty".to_string()));
        }

        for t in [self.default_rest_threshold, self.default_stream_threshold] {
            if !(0.0..=1.0).contains(&t) {
                return Err(Error::InvalidConfig(format!(
                    "confidence threshold must be in [0, 1], got {}",
                    t
                )));
            }
        }

        if self.min_output_height == 0 {
            return Err(Error::InvalidConfig(
                "min_output_height must be greater than 0".to_string(),
            ));
        }

        if self.ice_poll_interval_ms == 0 || self.ice_gather_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "ICE poll interval and timeout must be greater than 0".to_string(),
            ));
        }

        if self.ice_poll_interval_ms > self.ice_gather_timeout_ms {
            return Err(Error::InvalidConfig(format!(
                "ICE poll interval ({}ms) exceeds gathering timeout ({}ms)",
                self.ice_poll_interval_ms, self.ice_gather_timeout_ms
            )));
        }

        if self.max_sessions == 0 {
            return Err(Error::InvalidConfig(
                "max_sessions must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Interval between ICE gathering state polls
    pub fn ice_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ice_poll_interval_ms)
    }

    /// Upper bound on the ICE gathering wait
    pub fn ice_gather_timeout(&self) -> Duration {
        Duration::from_millis(self.ice_gather_timeout_ms)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            model_path: None,
            default_rest_threshold: 0.70,
            default_stream_threshold: 0.25,
            min_output_height: 720,
            ice_poll_interval_ms: 200,
            ice_gather_timeout_ms: 10_000,
            max_sessions: 32,
            publish_empty_detections: false,
        }
    }
}
