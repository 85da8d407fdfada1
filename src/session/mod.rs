//! Session lifecycle
//!
//! A session wraps one peer connection from offer to teardown: the
//! negotiated handshake, the per-peer confidence threshold, the metadata
//! publisher, and the annotation pipeline once the remote video track
//! arrives.

mod manager;
pub mod threshold;

pub use manager::{SessionAnswer, SessionManager};
pub use threshold::ThresholdCell;

use crate::channels::MetadataPublisher;
use crate::pipeline::PipelineHandle;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::RwLock;
use webrtc::data_channel::RTCDataChannel;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

/// Signaling progress of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, remote offer not yet applied
    New,
    /// Remote offer applied
    HaveRemoteOffer,
    /// Local answer created
    HaveLocalAnswer,
    /// Waiting for ICE candidate gathering
    IceGathering,
    /// Handshake finished, answer returned to the client
    Complete,
}

/// Events funneled from webrtc callbacks into the session's driver task.
/// Callbacks stay tiny; all session logic runs in one place.
pub enum SessionEvent {
    /// The remote peer opened its data channel
    DataChannelOpen(Arc<RTCDataChannel>),
    /// A message arrived on the side channel
    SideChannelMessage(Bytes),
    /// A remote media track started delivering RTP
    TrackArrived(Arc<TrackRemote>),
    /// Peer connection state changed
    ConnectionStateChanged(RTCPeerConnectionState),
}

/// One annotated-streaming session.
pub struct Session {
    /// Unique session identifier returned to the client
    pub id: String,
    pub(crate) pc: Arc<RTCPeerConnection>,
    pub(crate) state: RwLock<SessionState>,
    /// Live per-session confidence threshold
    pub threshold: Arc<ThresholdCell>,
    pub(crate) publisher: MetadataPublisher,
    /// Outbound annotated video track, negotiated in the answer
    pub(crate) local_video: Arc<TrackLocalStaticSample>,
    pub(crate) pipeline: RwLock<Option<PipelineHandle>>,
}

impl Session {
    /// Current signaling state
    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    pub(crate) async fn set_state(&self, state: SessionState) {
        *self.state.write().await = state;
    }

    /// Stop the pipeline and close the peer connection. Idempotent.
    pub async fn close(&self) {
        if let Some(handle) = self.pipeline.write().await.take() {
            handle.shutdown().await;
        }
        self.publisher.detach().await;
        let _ = self.pc.close().await;
    }
}
