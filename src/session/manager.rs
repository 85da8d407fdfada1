//! Session registry and WebRTC handshake
//!
//! The manager owns every live session, runs the offer/answer exchange,
//! and wires peer-connection callbacks into each session's driver task.
//! Callbacks only forward events; all session logic runs in the driver.

use super::{Session, SessionEvent, SessionState, ThresholdCell};
use crate::channels::{parse_config_update, DataChannelSink, MetadataPublisher};
use crate::config::ServiceConfig;
use crate::detect::SharedEngine;
use crate::media::{LocalTrackSink, RemoteTrackSource};
use crate::pipeline::AnnotationPipeline;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_H264};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_gathering_state::RTCIceGatheringState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Handshake result returned to the signaling client.
#[derive(Debug, Clone, Serialize)]
pub struct SessionAnswer {
    /// Identifier for the created session
    pub session_id: String,
    /// Local SDP answer
    pub sdp: String,
    /// SDP type, always "answer"
    #[serde(rename = "type")]
    pub sdp_type: String,
}

/// Owns all live sessions.
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
    engine: SharedEngine,
    config: ServiceConfig,
}

impl SessionManager {
    pub fn new(engine: SharedEngine, config: ServiceConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            engine,
            config,
        }
    }

    /// Run the offer/answer handshake and register a new session.
    ///
    /// Returns once ICE gathering completes so the answer carries all
    /// candidates (no trickle). The wait is bounded by the configured
    /// gathering timeout; on timeout the session is torn down and the
    /// handshake fails.
    pub async fn create_session(
        &self,
        offer_sdp: &str,
        offer_type: &str,
        initial_threshold: Option<f32>,
    ) -> Result<SessionAnswer> {
        if offer_sdp.trim().is_empty() {
            return Err(Error::Signaling("offer sdp is empty".to_string()));
        }
        if offer_type != "offer" {
            return Err(Error::Signaling(format!(
                "expected sdp type \"offer\", got \"{offer_type}\""
            )));
        }

        {
            let sessions = self.sessions.read().await;
            if sessions.len() >= self.config.max_sessions {
                return Err(Error::ConnectionFailure(format!(
                    "session limit reached ({} active)",
                    sessions.len()
                )));
            }
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        let api = build_api()?;
        let rtc_config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: self.config.stun_servers.clone(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let pc = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(|e| Error::WebRtc(format!("new_peer_connection: {e}")))?,
        );

        // The annotated return track goes into the answer up front; the
        // pipeline starts writing to it when the remote track arrives.
        let local_video = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_H264.to_owned(),
                clock_rate: 90_000,
                ..Default::default()
            },
            "video".to_owned(),
            format!("argos-{session_id}"),
        ));
        let rtp_sender = pc
            .add_track(Arc::clone(&local_video) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::WebRtc(format!("add_track: {e}")))?;

        // Drain RTCP so the interceptors keep running
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while rtp_sender.read(&mut rtcp_buf).await.is_ok() {}
        });

        let threshold = initial_threshold.unwrap_or(self.config.default_stream_threshold);
        let session = Arc::new(Session {
            id: session_id.clone(),
            pc: pc.clone(),
            state: RwLock::new(SessionState::New),
            threshold: Arc::new(ThresholdCell::new(threshold)),
            publisher: MetadataPublisher::new(),
            local_video,
            pipeline: RwLock::new(None),
        });

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        register_callbacks(&pc, &event_tx);
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), session.clone());

        tokio::spawn(drive_session(
            session.clone(),
            self.engine.clone(),
            self.config.clone(),
            self.sessions.clone(),
            event_rx,
            event_tx,
        ));

        info!(session_id = %session_id, threshold, "session created, starting handshake");
        match self.negotiate(&session, offer_sdp).await {
            Ok(answer) => Ok(answer),
            Err(e) => {
                warn!(session_id = %session_id, "handshake failed: {e}");
                self.sessions.write().await.remove(&session_id);
                session.close().await;
                Err(e)
            }
        }
    }

    async fn negotiate(&self, session: &Arc<Session>, offer_sdp: &str) -> Result<SessionAnswer> {
        let pc = &session.pc;

        let offer = RTCSessionDescription::offer(offer_sdp.to_string())
            .map_err(|e| Error::Sdp(format!("invalid offer: {e}")))?;
        pc.set_remote_description(offer)
            .await
            .map_err(|e| Error::Sdp(format!("set_remote_description: {e}")))?;
        session.set_state(SessionState::HaveRemoteOffer).await;

        let answer = pc
            .create_answer(None)
            .await
            .map_err(|e| Error::Sdp(format!("create_answer: {e}")))?;
        pc.set_local_description(answer)
            .await
            .map_err(|e| Error::Sdp(format!("set_local_description: {e}")))?;
        session.set_state(SessionState::HaveLocalAnswer).await;

        session.set_state(SessionState::IceGathering).await;
        let deadline = Instant::now() + self.config.ice_gather_timeout();
        while pc.ice_gathering_state() != RTCIceGatheringState::Complete {
            if Instant::now() >= deadline {
                return Err(Error::Signaling(format!(
                    "ICE gathering did not complete within {}ms",
                    self.config.ice_gather_timeout_ms
                )));
            }
            tokio::time::sleep(self.config.ice_poll_interval()).await;
        }

        let local = pc
            .local_description()
            .await
            .ok_or_else(|| Error::Sdp("local description missing after gathering".to_string()))?;
        session.set_state(SessionState::Complete).await;
        info!(session_id = %session.id, "handshake complete");

        Ok(SessionAnswer {
            session_id: session.id.clone(),
            sdp: local.sdp,
            sdp_type: local.sdp_type.to_string(),
        })
    }

    /// Look up a session by id.
    pub async fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Number of live sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Close every session concurrently and clear the registry.
    pub async fn shutdown_all(&self) {
        let sessions: Vec<Arc<Session>> = {
            let mut map = self.sessions.write().await;
            map.drain().map(|(_, s)| s).collect()
        };
        if sessions.is_empty() {
            return;
        }
        info!(count = sessions.len(), "closing all sessions");
        futures::future::join_all(sessions.iter().map(|s| s.close())).await;
    }
}

/// Build the webrtc API with an H.264-only media engine. If the codec
/// registration fails the engine falls back to the full default set.
fn build_api() -> Result<webrtc::api::API> {
    let mut media_engine = MediaEngine::default();
    let h264 = RTCRtpCodecParameters {
        capability: RTCRtpCodecCapability {
            mime_type: MIME_TYPE_H264.to_owned(),
            clock_rate: 90_000,
            channels: 0,
            sdp_fmtp_line:
                "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42001f".to_owned(),
            rtcp_feedback: vec![],
        },
        payload_type: 102,
        ..Default::default()
    };
    if let Err(e) = media_engine.register_codec(h264, RTPCodecType::Video) {
        warn!("H264 codec registration failed, falling back to default codecs: {e}");
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::WebRtc(format!("register_default_codecs: {e}")))?;
    }

    let registry = register_default_interceptors(Registry::new(), &mut media_engine)
        .map_err(|e| Error::WebRtc(format!("register_default_interceptors: {e}")))?;

    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build())
}

fn register_callbacks(
    pc: &Arc<webrtc::peer_connection::RTCPeerConnection>,
    event_tx: &mpsc::UnboundedSender<SessionEvent>,
) {
    let tx = event_tx.clone();
    pc.on_data_channel(Box::new(move |dc| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(SessionEvent::DataChannelOpen(dc));
        })
    }));

    let tx = event_tx.clone();
    pc.on_track(Box::new(move |track, _receiver, _transceiver| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(SessionEvent::TrackArrived(track));
        })
    }));

    let tx = event_tx.clone();
    pc.on_peer_connection_state_change(Box::new(move |state| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(SessionEvent::ConnectionStateChanged(state));
        })
    }));
}

/// Per-session event loop. Runs until the connection dies or the event
/// channel closes.
async fn drive_session(
    session: Arc<Session>,
    engine: SharedEngine,
    config: ServiceConfig,
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
    mut event_rx: mpsc::UnboundedReceiver<SessionEvent>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
) {
    while let Some(event) = event_rx.recv().await {
        match event {
            SessionEvent::DataChannelOpen(dc) => {
                info!(session_id = %session.id, label = %dc.label(), "data channel open");
                let tx = event_tx.clone();
                dc.on_message(Box::new(move |msg| {
                    let tx = tx.clone();
                    Box::pin(async move {
                        let _ = tx.send(SessionEvent::SideChannelMessage(msg.data));
                    })
                }));
                session
                    .publisher
                    .attach(Arc::new(DataChannelSink::new(dc)))
                    .await;
            }

            SessionEvent::SideChannelMessage(data) => match parse_config_update(&data) {
                Some(conf) => {
                    session.threshold.set(conf);
                    info!(
                        session_id = %session.id,
                        threshold = session.threshold.get(),
                        "confidence threshold updated"
                    );
                }
                None => {
                    debug!(session_id = %session.id, "ignoring unrecognized side-channel message");
                }
            },

            SessionEvent::TrackArrived(track) => {
                if track.kind() != RTPCodecType::Video {
                    debug!(session_id = %session.id, "ignoring non-video track");
                    continue;
                }
                let mut slot = session.pipeline.write().await;
                if slot.is_some() {
                    warn!(session_id = %session.id, "ignoring additional video track");
                    continue;
                }
                info!(
                    session_id = %session.id,
                    track_id = %track.id(),
                    "video track arrived, starting pipeline"
                );
                let handle = AnnotationPipeline::new(
                    engine.clone(),
                    session.threshold.clone(),
                    session.publisher.clone(),
                    config.min_output_height,
                    config.publish_empty_detections,
                )
                .spawn(
                    RemoteTrackSource::new(track),
                    LocalTrackSink::new(session.local_video.clone()),
                );
                *slot = Some(handle);
            }

            SessionEvent::ConnectionStateChanged(state) => {
                info!(session_id = %session.id, ?state, "connection state changed");
                if matches!(
                    state,
                    RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed
                ) {
                    sessions.write().await.remove(&session.id);
                    session.close().await;
                    break;
                }
            }
        }
    }
    debug!(session_id = %session.id, "session driver exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::DisabledEngine;
    use crate::media::{FrameSink, FrameSource, VideoFrame};
    use async_trait::async_trait;
    use std::time::Duration;

    fn manager() -> SessionManager {
        SessionManager::new(Arc::new(DisabledEngine), ServiceConfig::default())
    }

    struct PendingSource;

    #[async_trait]
    impl FrameSource for PendingSource {
        async fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
            std::future::pending::<()>().await;
            unreachable!()
        }
    }

    struct NullSink;

    #[async_trait]
    impl FrameSink for NullSink {
        async fn send_frame(&mut self, _frame: VideoFrame) -> Result<()> {
            Ok(())
        }
    }

    async fn loopback_session(id: &str) -> Arc<Session> {
        let api = build_api().unwrap();
        let pc = Arc::new(
            api.new_peer_connection(RTCConfiguration::default())
                .await
                .unwrap(),
        );
        let local_video = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_H264.to_owned(),
                clock_rate: 90_000,
                ..Default::default()
            },
            "video".to_owned(),
            format!("argos-{id}"),
        ));
        Arc::new(Session {
            id: id.to_string(),
            pc,
            state: RwLock::new(SessionState::Complete),
            threshold: Arc::new(ThresholdCell::new(0.25)),
            publisher: MetadataPublisher::new(),
            local_video,
            pipeline: RwLock::new(None),
        })
    }

    #[tokio::test]
    async fn test_failed_connection_removes_session_and_stops_pipeline() {
        let session = loopback_session("failing").await;

        // Give the session a live pipeline so teardown has one to stop
        let handle = AnnotationPipeline::new(
            Arc::new(DisabledEngine),
            session.threshold.clone(),
            session.publisher.clone(),
            32,
            false,
        )
        .spawn(PendingSource, NullSink);
        *session.pipeline.write().await = Some(handle);

        let sessions: Arc<RwLock<HashMap<String, Arc<Session>>>> =
            Arc::new(RwLock::new(HashMap::new()));
        sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(drive_session(
            session.clone(),
            Arc::new(DisabledEngine),
            ServiceConfig::default(),
            sessions.clone(),
            event_rx,
            event_tx.clone(),
        ));

        event_tx
            .send(SessionEvent::ConnectionStateChanged(
                RTCPeerConnectionState::Failed,
            ))
            .unwrap();

        // The driver tears the session down and exits
        tokio::time::timeout(Duration::from_secs(10), driver)
            .await
            .expect("driver did not exit")
            .unwrap();
        assert_eq!(sessions.read().await.len(), 0);
        assert!(session.pipeline.read().await.is_none());
    }

    #[tokio::test]
    async fn test_disconnected_state_does_not_tear_down() {
        let session = loopback_session("wobbly").await;
        let sessions: Arc<RwLock<HashMap<String, Arc<Session>>>> =
            Arc::new(RwLock::new(HashMap::new()));
        sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(drive_session(
            session.clone(),
            Arc::new(DisabledEngine),
            ServiceConfig::default(),
            sessions.clone(),
            event_rx,
            event_tx.clone(),
        ));

        event_tx
            .send(SessionEvent::ConnectionStateChanged(
                RTCPeerConnectionState::Disconnected,
            ))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // A transient disconnect leaves the session registered
        assert_eq!(sessions.read().await.len(), 1);
        drop(event_tx);
        let _ = tokio::time::timeout(Duration::from_secs(5), driver).await;
        session.close().await;
    }

    #[tokio::test]
    async fn test_empty_offer_rejected_without_side_effects() {
        let manager = manager();
        let err = manager.create_session("", "offer", None).await.unwrap_err();
        assert!(err.is_signaling_error());
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_wrong_sdp_type_rejected() {
        let manager = manager();
        let err = manager
            .create_session("v=0", "answer", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Signaling(_)));
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_malformed_offer_leaves_registry_empty() {
        let manager = manager();
        let err = manager
            .create_session("this is not sdp", "offer", None)
            .await
            .unwrap_err();
        assert!(err.is_signaling_error());
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_session_limit_enforced() {
        let config = ServiceConfig {
            max_sessions: 0,
            ..Default::default()
        };
        // max_sessions of zero fails validation; bypass it to exercise the
        // limit check directly
        let manager = SessionManager::new(Arc::new(DisabledEngine), config);
        let err = manager
            .create_session("v=0", "offer", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionFailure(_)));
    }

    #[tokio::test]
    async fn test_shutdown_all_with_no_sessions() {
        let manager = manager();
        manager.shutdown_all().await;
        assert_eq!(manager.session_count().await, 0);
    }

    #[test]
    fn test_session_answer_wire_shape() {
        let answer = SessionAnswer {
            session_id: "abc".to_string(),
            sdp: "v=0".to_string(),
            sdp_type: "answer".to_string(),
        };
        let json = serde_json::to_value(&answer).unwrap();
        assert_eq!(json["type"], "answer");
        assert_eq!(json["session_id"], "abc");
    }
}
