//! Media plumbing: frames, codecs, and WebRTC track adapters

pub mod codec;
pub mod frame;
pub mod track;

pub use codec::{VideoDecoder, VideoEncoder};
pub use frame::{ensure_min_height, FrameSink, FrameSource, VideoFrame};
pub use track::{LocalTrackSink, RemoteTrackSource};
