//! Best-effort metadata publishing
//!
//! The publisher decouples the pipeline from the data channel's lifecycle:
//! the pipeline publishes every frame's stats, and whether anything goes out
//! depends on whether a sink is attached and open at that moment. Publish
//! failures are logged and swallowed; the media path never blocks on the
//! side channel.

use super::messages::FrameStats;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;

/// Where metadata goes. Implemented by the WebRTC data channel; tests use
/// in-memory sinks.
#[async_trait]
pub trait MetadataSink: Send + Sync {
    /// Whether the sink currently accepts messages
    fn is_open(&self) -> bool;

    /// Send one JSON text payload
    async fn send_text(&self, payload: String) -> Result<()>;
}

/// Data-channel backed sink.
pub struct DataChannelSink {
    channel: Arc<RTCDataChannel>,
}

impl DataChannelSink {
    pub fn new(channel: Arc<RTCDataChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl MetadataSink for DataChannelSink {
    fn is_open(&self) -> bool {
        self.channel.ready_state() == RTCDataChannelState::Open
    }

    async fn send_text(&self, payload: String) -> Result<()> {
        self.channel
            .send_text(payload)
            .await
            .map(|_| ())
            .map_err(|e| Error::SideChannel(format!("send_text: {e}")))
    }
}

/// Cloneable handle publishing frame stats to whatever sink is attached.
#[derive(Clone, Default)]
pub struct MetadataPublisher {
    sink: Arc<RwLock<Option<Arc<dyn MetadataSink>>>>,
}

impl MetadataPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach (or replace) the sink. Called when the peer's data channel
    /// opens.
    pub async fn attach(&self, sink: Arc<dyn MetadataSink>) {
        *self.sink.write().await = Some(sink);
    }

    /// Detach the current sink.
    pub async fn detach(&self) {
        *self.sink.write().await = None;
    }

    /// Publish one frame's stats. A missing or closed sink is a silent
    /// no-op; a send failure is logged and swallowed.
    pub async fn publish(&self, stats: &FrameStats) {
        let sink = { self.sink.read().await.clone() };
        let Some(sink) = sink else {
            return;
        };
        if !sink.is_open() {
            debug!(frame_id = stats.frame_id, "side channel not open, dropping stats");
            return;
        }

        let payload = match serde_json::to_string(stats) {
            Ok(p) => p,
            Err(e) => {
                warn!("failed to serialize frame stats: {e}");
                return;
            }
        };
        if let Err(e) = sink.send_text(payload).await {
            warn!(frame_id = stats.frame_id, "side channel publish failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct RecordingSink {
        open: AtomicBool,
        sent: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn new(open: bool) -> Arc<Self> {
            Arc::new(Self {
                open: AtomicBool::new(open),
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl MetadataSink for RecordingSink {
        fn is_open(&self) -> bool {
            self.open.load(Ordering::Relaxed)
        }

        async fn send_text(&self, payload: String) -> Result<()> {
            self.sent.lock().unwrap().push(payload);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_publish_without_sink_is_noop() {
        let publisher = MetadataPublisher::new();
        publisher
            .publish(&FrameStats::now(1.0, 10, 10, 1, Vec::new()))
            .await;
    }

    #[tokio::test]
    async fn test_publish_reaches_open_sink() {
        let publisher = MetadataPublisher::new();
        let sink = RecordingSink::new(true);
        publisher.attach(sink.clone()).await;

        publisher
            .publish(&FrameStats::now(24.0, 1280, 720, 7, Vec::new()))
            .await;

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("\"frame_id\":7"));
    }

    #[tokio::test]
    async fn test_publish_skips_closed_sink() {
        let publisher = MetadataPublisher::new();
        let sink = RecordingSink::new(false);
        publisher.attach(sink.clone()).await;

        publisher
            .publish(&FrameStats::now(24.0, 1280, 720, 1, Vec::new()))
            .await;
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_attach_replaces_sink() {
        let publisher = MetadataPublisher::new();
        let first = RecordingSink::new(true);
        let second = RecordingSink::new(true);
        publisher.attach(first.clone()).await;
        publisher.attach(second.clone()).await;

        publisher
            .publish(&FrameStats::now(1.0, 10, 10, 1, Vec::new()))
            .await;
        assert!(first.sent.lock().unwrap().is_empty());
        assert_eq!(second.sent.lock().unwrap().len(), 1);
    }
}
