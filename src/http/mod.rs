//! HTTP surface: signaling, health, and single-image detection
//!
//! Three small endpoint groups on one router: `POST /webrtc/offer` runs
//! the session handshake, `GET /health` and `GET /ready` report liveness
//! and model readiness, and `POST /v1/detect` serves one-shot detection
//! over an uploaded image.

use crate::config::ServiceConfig;
use crate::detect::{Detection, SharedEngine};
use crate::session::SessionManager;
use crate::Error;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Maximum accepted upload size for `/v1/detect` (16 MiB)
const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub engine: SharedEngine,
    pub config: ServiceConfig,
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webrtc/offer", post(webrtc_offer))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/v1/detect", post(detect))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn map_error(e: &Error) -> Response {
    let status = if e.is_signaling_error() {
        StatusCode::BAD_REQUEST
    } else {
        match e {
            Error::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::ConnectionFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    };
    error_response(status, e.to_string())
}

/// `POST /webrtc/offer` with `{"sdp": "...", "type": "offer", "conf": 0.4}`.
///
/// The body is parsed leniently: `type` defaults to "offer" and `conf` to
/// the configured stream threshold; a missing `sdp` is a 400 before any
/// session state is created.
async fn webrtc_offer(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("invalid JSON: {e}")),
    };

    let Some(sdp) = body.get("sdp").and_then(Value::as_str) else {
        return error_response(StatusCode::BAD_REQUEST, "missing \"sdp\" field");
    };
    let sdp_type = body
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("offer");
    let conf = body.get("conf").and_then(Value::as_f64).map(|c| c as f32);

    match state.sessions.create_session(sdp, sdp_type, conf).await {
        Ok(answer) => {
            info!(session_id = %answer.session_id, "offer accepted");
            Json(answer).into_response()
        }
        Err(e) => {
            warn!("offer rejected: {e}");
            map_error(&e)
        }
    }
}

/// `GET /health`: process liveness
async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

/// `GET /ready`: 200 once the model can serve, 503 before that
async fn ready(State(state): State<AppState>) -> Response {
    let ready = state.engine.is_ready();
    let body = Json(json!({ "ok": ready, "gpu": state.engine.uses_gpu() }));
    if ready {
        body.into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct DetectParams {
    conf: Option<f32>,
    imgsz: Option<u32>,
}

/// `POST /v1/detect`: multipart image upload, returns detections as JSON.
async fn detect(
    State(state): State<AppState>,
    Query(params): Query<DetectParams>,
    mut multipart: Multipart,
) -> Response {
    let conf = params.conf.unwrap_or(state.config.default_rest_threshold);
    if !(0.0..=1.0).contains(&conf) {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("conf must be in [0, 1], got {conf}"),
        );
    }
    if let Some(imgsz) = params.imgsz {
        if !(32..=4096).contains(&imgsz) {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("imgsz must be in [32, 4096], got {imgsz}"),
            );
        }
    }

    if !state.engine.is_ready() {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "model not ready");
    }

    let mut image_bytes = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                let is_image = matches!(field.name(), Some("file") | Some("image") | None);
                match field.bytes().await {
                    Ok(bytes) if is_image && image_bytes.is_none() => image_bytes = Some(bytes),
                    Ok(_) => {}
                    Err(e) => {
                        return error_response(
                            StatusCode::BAD_REQUEST,
                            format!("invalid multipart body: {e}"),
                        )
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("invalid multipart body: {e}"),
                )
            }
        }
    }
    let Some(image_bytes) = image_bytes else {
        return error_response(StatusCode::BAD_REQUEST, "missing image file field");
    };

    let image = match image::load_from_memory(&image_bytes) {
        Ok(image) => image.to_rgb8(),
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, format!("cannot decode image: {e}"))
        }
    };
    let (img_w, img_h) = (image.width(), image.height());

    let engine = state.engine.clone();
    let imgsz = params.imgsz;
    let started = Instant::now();
    let result =
        tokio::task::spawn_blocking(move || engine.infer(&image, conf, imgsz)).await;

    let raw = match result {
        Ok(Ok(raw)) => raw,
        Ok(Err(e)) => return map_error(&e),
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("inference task failed: {e}"),
            )
        }
    };

    let elapsed = started.elapsed().as_secs_f64();
    let detections: Vec<Detection> = raw
        .iter()
        .map(|r| Detection::from_raw(r, img_w, img_h))
        .collect();

    Json(json!({
        "ts": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "model": state.engine.model_name(),
        "fps": if elapsed > 0.0 { 1.0 / elapsed } else { 0.0 },
        "img_w": img_w,
        "img_h": img_h,
        "detections": detections,
    }))
    .into_response()
}
