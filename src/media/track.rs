//! WebRTC track adapters
//!
//! Bridges the pipeline's frame seams onto webrtc-rs tracks: the source
//! pulls RTP from a remote track and decodes it, the sink encodes frames
//! and writes samples to a local track.

use super::codec::{VideoDecoder, VideoEncoder};
use super::frame::{FrameSink, FrameSource, VideoFrame};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

/// RTP clock rate for video tracks
const RTP_CLOCK_RATE: u32 = 90_000;

/// Fallback sample duration when pts does not advance (roughly 30 fps)
const DEFAULT_FRAME_DURATION: Duration = Duration::from_millis(33);

/// Reads from an inbound remote track and decodes frames.
pub struct RemoteTrackSource {
    track: Arc<TrackRemote>,
    decoder: VideoDecoder,
}

impl RemoteTrackSource {
    pub fn new(track: Arc<TrackRemote>) -> Self {
        Self {
            track,
            decoder: VideoDecoder::new(),
        }
    }
}

#[async_trait]
impl FrameSource for RemoteTrackSource {
    async fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        loop {
            // No idle bound here: a paused sender is a quiet track, not a
            // dead one. The read only ends when the track itself closes.
            let (packet, _) = match self.track.read_rtp().await {
                Ok(pair) => pair,
                Err(e) => {
                    debug!(track_id = %self.track.id(), "remote track closed: {e}");
                    return Ok(None);
                }
            };

            let pts = packet.header.timestamp as i64;
            if let Some(image) = self.decoder.push_packet(&packet)? {
                return Ok(Some(VideoFrame {
                    image,
                    pts,
                    time_base: (1, RTP_CLOCK_RATE),
                }));
            }
        }
    }
}

/// Encodes frames and writes them to an outbound local track.
pub struct LocalTrackSink {
    track: Arc<TrackLocalStaticSample>,
    encoder: VideoEncoder,
    last_pts: Option<i64>,
}

impl LocalTrackSink {
    pub fn new(track: Arc<TrackLocalStaticSample>) -> Self {
        Self {
            track,
            encoder: VideoEncoder::new(),
            last_pts: None,
        }
    }

    fn sample_duration(&mut self, frame: &VideoFrame) -> Duration {
        let (num, den) = frame.time_base;
        let duration = match self.last_pts {
            Some(last) if frame.pts > last && den > 0 => {
                let delta = (frame.pts - last) as f64 * num as f64 / den as f64;
                Duration::from_secs_f64(delta)
            }
            _ => DEFAULT_FRAME_DURATION,
        };
        self.last_pts = Some(frame.pts);
        duration
    }
}

#[async_trait]
impl FrameSink for LocalTrackSink {
    async fn send_frame(&mut self, frame: VideoFrame) -> Result<()> {
        let duration = self.sample_duration(&frame);
        let data = self.encoder.encode(&frame.image)?;

        self.track
            .write_sample(&Sample {
                data,
                duration,
                ..Default::default()
            })
            .await
            .map_err(|e| Error::MediaTrack(format!("write_sample: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use webrtc::api::media_engine::MIME_TYPE_H264;
    use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;

    fn frame(pts: i64) -> VideoFrame {
        VideoFrame {
            image: RgbImage::new(4, 4),
            pts,
            time_base: (1, RTP_CLOCK_RATE),
        }
    }

    fn sink() -> LocalTrackSink {
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_H264.to_owned(),
                clock_rate: RTP_CLOCK_RATE,
                ..Default::default()
            },
            "video".to_owned(),
            "argos".to_owned(),
        ));
        LocalTrackSink::new(track)
    }

    #[test]
    fn test_first_frame_uses_default_duration() {
        let mut s = sink();
        assert_eq!(s.sample_duration(&frame(3000)), DEFAULT_FRAME_DURATION);
    }

    #[test]
    fn test_duration_from_pts_delta() {
        let mut s = sink();
        s.sample_duration(&frame(0));
        // 3000 ticks at 90kHz is one frame at 30 fps
        let d = s.sample_duration(&frame(3000));
        assert!((d.as_secs_f64() - 1.0 / 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_monotonic_pts_falls_back() {
        let mut s = sink();
        s.sample_duration(&frame(9000));
        assert_eq!(s.sample_duration(&frame(9000)), DEFAULT_FRAME_DURATION);
        assert_eq!(s.sample_duration(&frame(100)), DEFAULT_FRAME_DURATION);
    }
}
