//! Annotation server binary entry point
//!
//! Serves WebRTC signaling, health probes, and single-image detection on
//! one HTTP listener.
//!
//! # Usage
//!
//! ```bash
//! # Run without a model (video loops through unannotated, /ready is 503)
//! cargo run --bin argos_server -- --bind 0.0.0.0:8080
//!
//! # Run with a YOLO model
//! cargo run --bin argos_server --features onnx -- \
//!   --model ./models/yolo11n.onnx \
//!   --stream-conf 0.25
//! ```

use argos_rtc::detect::{DisabledEngine, SharedEngine};
use argos_rtc::http::{router, AppState};
use argos_rtc::{ServiceConfig, SessionManager};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Argos annotation server
///
/// Accepts WebRTC offers, annotates inbound video with object detections,
/// and returns the overlay stream plus per-frame metadata.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// HTTP bind address (signaling + REST)
    #[arg(long, default_value = "0.0.0.0:8080", env = "ARGOS_BIND")]
    bind: String,

    /// Path to the ONNX detection model (requires the 'onnx' feature)
    #[arg(long, env = "ARGOS_MODEL")]
    model: Option<String>,

    /// STUN servers (comma-separated)
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "stun:stun.l.google.com:19302",
        env = "ARGOS_STUN_SERVERS"
    )]
    stun_servers: Vec<String>,

    /// Default confidence threshold for streaming sessions
    #[arg(long, default_value_t = 0.25, env = "ARGOS_STREAM_CONF")]
    stream_conf: f32,

    /// Default confidence threshold for /v1/detect
    #[arg(long, default_value_t = 0.70, env = "ARGOS_REST_CONF")]
    rest_conf: f32,

    /// Minimum output frame height; lower frames are upscaled
    #[arg(long, default_value_t = 720, env = "ARGOS_MIN_HEIGHT")]
    min_height: u32,

    /// Maximum concurrent sessions
    #[arg(long, default_value_t = 32, env = "ARGOS_MAX_SESSIONS")]
    max_sessions: usize,

    /// ICE gathering timeout in milliseconds
    #[arg(long, default_value_t = 10_000, env = "ARGOS_ICE_TIMEOUT_MS")]
    ice_timeout_ms: u64,

    /// Publish side-channel metadata for frames with zero detections
    #[arg(long, default_value_t = false, env = "ARGOS_PUBLISH_EMPTY")]
    publish_empty: bool,
}

fn build_engine(model_path: Option<&str>) -> SharedEngine {
    match model_path {
        #[cfg(feature = "onnx")]
        Some(path) => match argos_rtc::detect::OnnxYoloEngine::load(path) {
            Ok(engine) => Arc::new(engine),
            Err(e) => {
                warn!("failed to load model from {path}: {e}; running without detection");
                Arc::new(DisabledEngine)
            }
        },
        #[cfg(not(feature = "onnx"))]
        Some(path) => {
            warn!("model path {path} given but the 'onnx' feature is not enabled");
            Arc::new(DisabledEngine)
        }
        None => {
            info!("no model configured, detection disabled");
            Arc::new(DisabledEngine)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .expect("valid default log filter");
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = ServiceConfig {
        bind_address: args.bind.clone(),
        stun_servers: args.stun_servers.clone(),
        model_path: args.model.clone(),
        default_rest_threshold: args.rest_conf,
        default_stream_threshold: args.stream_conf,
        min_output_height: args.min_height,
        max_sessions: args.max_sessions,
        ice_gather_timeout_ms: args.ice_timeout_ms,
        publish_empty_detections: args.publish_empty,
        ..Default::default()
    };
    config.validate()?;

    let engine = build_engine(config.model_path.as_deref());
    let sessions = Arc::new(SessionManager::new(engine.clone(), config.clone()));
    let app = router(AppState {
        sessions: sessions.clone(),
        engine,
        config: config.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(
        version = argos_rtc::version(),
        bind = %config.bind_address,
        "argos server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    sessions.shutdown_all().await;
    info!("server stopped");
    Ok(())
}
