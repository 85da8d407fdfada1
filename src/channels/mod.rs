//! Data-channel messaging: wire shapes and best-effort publishing

pub mod messages;
pub mod publisher;

pub use messages::{parse_config_update, FrameStats};
pub use publisher::{DataChannelSink, MetadataPublisher, MetadataSink};
