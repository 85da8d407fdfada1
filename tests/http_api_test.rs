//! Integration test for the HTTP surface
//!
//! Exercises the router end to end with in-memory requests: signaling
//! rejections leave no session behind, probes report engine readiness,
//! and `/v1/detect` returns the documented response shape.

use argos_rtc::detect::{InferenceEngine, RawDetection, SharedEngine};
use argos_rtc::http::{router, AppState};
use argos_rtc::{Result, ServiceConfig, SessionManager};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use image::RgbImage;
use std::sync::Arc;
use tower::ServiceExt;

struct StubEngine {
    ready: bool,
}

impl InferenceEngine for StubEngine {
    fn infer(
        &self,
        image: &RgbImage,
        threshold: f32,
        _input_size: Option<u32>,
    ) -> Result<Vec<RawDetection>> {
        let dets = vec![
            RawDetection {
                label: "person".to_string(),
                confidence: 0.91,
                x1: 2.0,
                y1: 2.0,
                x2: image.width() as f32 - 2.0,
                y2: image.height() as f32 - 2.0,
            },
            RawDetection {
                label: "dog".to_string(),
                confidence: 0.40,
                x1: 1.0,
                y1: 1.0,
                x2: 5.0,
                y2: 5.0,
            },
        ];
        Ok(dets
            .into_iter()
            .filter(|d| d.confidence >= threshold)
            .collect())
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn uses_gpu(&self) -> bool {
        false
    }

    fn model_name(&self) -> &str {
        "stub-yolo"
    }
}

fn state(engine: SharedEngine) -> AppState {
    let config = ServiceConfig::default();
    AppState {
        sessions: Arc::new(SessionManager::new(engine.clone(), config.clone())),
        engine,
        config,
    }
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn png_upload(boundary: &str) -> Vec<u8> {
    let img = RgbImage::new(100, 60);
    let mut cursor = std::io::Cursor::new(Vec::new());
    img.write_to(&mut cursor, image::ImageFormat::Png).unwrap();

    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"file\"; filename=\"shot.png\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
    body.extend_from_slice(&cursor.into_inner());
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[tokio::test]
async fn test_rejected_offer_leaves_no_session() {
    let state = state(Arc::new(StubEngine { ready: true }));
    let sessions = state.sessions.clone();
    let app = router(state);

    let response = app
        .oneshot(
            Request::post("/webrtc/offer")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"sdp": "", "type": "offer"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(sessions.session_count().await, 0);
}

#[tokio::test]
async fn test_offer_with_wrong_type_rejected() {
    let app = router(state(Arc::new(StubEngine { ready: true })));
    let response = app
        .oneshot(
            Request::post("/webrtc/offer")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"sdp": "v=0", "type": "answer"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_probes_reflect_engine_readiness() {
    let app = router(state(Arc::new(StubEngine { ready: false })));
    let health = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    let ready = app
        .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);

    let app = router(state(Arc::new(StubEngine { ready: true })));
    let ready = app
        .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(ready.status(), StatusCode::OK);
    let json = body_json(ready).await;
    assert_eq!(json["ok"], true);
    assert_eq!(json["gpu"], false);
}

#[tokio::test]
async fn test_detect_applies_query_threshold() {
    let boundary = "it-boundary";
    let app = router(state(Arc::new(StubEngine { ready: true })));

    // Default REST threshold (0.70) filters out the 0.40 detection
    let response = app
        .clone()
        .oneshot(
            Request::post("/v1/detect")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(png_upload(boundary)))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["model"], "stub-yolo");
    assert_eq!(json["img_w"], 100);
    assert_eq!(json["img_h"], 60);
    assert_eq!(json["detections"].as_array().unwrap().len(), 1);

    // Lowered threshold admits both
    let response = app
        .oneshot(
            Request::post("/v1/detect?conf=0.3")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(png_upload(boundary)))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let detections = json["detections"].as_array().unwrap();
    assert_eq!(detections.len(), 2);
    // Boxes are normalized against the uploaded image's dimensions
    for det in detections {
        for v in det["bbox_xywh_norm"].as_array().unwrap() {
            let v = v.as_f64().unwrap();
            assert!((0.0..=1.0).contains(&v));
        }
    }
}

#[tokio::test]
async fn test_detect_missing_file_field_rejected() {
    let boundary = "it-boundary";
    let body = format!("--{boundary}--\r\n");
    let app = router(state(Arc::new(StubEngine { ready: true })));
    let response = app
        .oneshot(
            Request::post("/v1/detect")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
