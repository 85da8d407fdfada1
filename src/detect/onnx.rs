//! ONNX Runtime YOLO engine
//!
//! Loads a YOLO-family detection model exported to ONNX and decodes its
//! transposed `[1, 4 + classes, candidates]` output. CUDA is used when the
//! runtime can register it, otherwise inference stays on the CPU.

use super::{InferenceEngine, RawDetection};
use crate::{Error, Result};
use image::{imageops::FilterType, RgbImage};
use ndarray::{s, Array4, ArrayViewD, Axis, IxDyn};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{info, warn};

/// COCO class labels (80 classes), index-aligned with model class ids
const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Default model input size (square)
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Cap on detections returned per frame
const MAX_DETECTIONS: usize = 100;

/// YOLO inference over ONNX Runtime
pub struct OnnxYoloEngine {
    session: Mutex<Session>,
    ready: AtomicBool,
    gpu: bool,
    name: String,
}

impl OnnxYoloEngine {
    /// Load a model from disk and warm it up.
    ///
    /// The warm-up pass latches readiness; a model that loads but cannot
    /// run stays not-ready and the service degrades per the
    /// `ModelUnavailable` contract.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model.onnx".to_string());

        let mut builder = Session::builder()
            .map_err(|e| Error::ModelUnavailable(format!("session builder: {e}")))?
            .with_intra_threads(4)
            .map_err(|e| Error::ModelUnavailable(format!("session builder: {e}")))?;

        // CUDA is opportunistic: register it when available, fall back to CPU
        let mut gpu = false;
        let cuda = CUDAExecutionProvider::default().build();
        match builder.clone().with_execution_providers([cuda]) {
            Ok(with_cuda) => {
                builder = with_cuda;
                gpu = true;
            }
            Err(e) => {
                warn!("CUDA unavailable, staying on CPU: {e}");
            }
        }

        let model_bytes = std::fs::read(path)?;
        let session = builder
            .commit_from_memory(&model_bytes)
            .map_err(|e| Error::ModelUnavailable(format!("failed to load {name}: {e}")))?;

        let engine = Self {
            session: Mutex::new(session),
            ready: AtomicBool::new(false),
            gpu,
            name,
        };

        let probe = RgbImage::new(64, 64);
        match engine.run_inference(&probe, 0.01, None) {
            Ok(_) => {
                engine.ready.store(true, Ordering::Release);
                info!(model = %engine.name, gpu = engine.gpu, "model loaded and warmed up");
            }
            Err(e) => {
                warn!(model = %engine.name, "warm-up inference failed: {e}");
            }
        }

        Ok(engine)
    }

    fn run_inference(
        &self,
        rgb: &RgbImage,
        threshold: f32,
        input_size: Option<u32>,
    ) -> Result<Vec<RawDetection>> {
        let imgsz = input_size.unwrap_or(DEFAULT_INPUT_SIZE) as usize;
        let resized = image::imageops::resize(rgb, imgsz as u32, imgsz as u32, FilterType::Nearest);

        let mut input = Array4::<f32>::zeros((1, 3, imgsz, imgsz));
        for (x, y, pixel) in resized.enumerate_pixels() {
            input[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
            input[[0, 1, y as usize, x as usize]] = pixel[1] as f32 / 255.0;
            input[[0, 2, y as usize, x as usize]] = pixel[2] as f32 / 255.0;
        }

        let input_shape = vec![1i64, 3, imgsz as i64, imgsz as i64];
        let input_tensor = Value::from_array((input_shape, input.into_raw_vec()))
            .map_err(|e| Error::Inference(format!("input tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| Error::Inference("session lock poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs![input_tensor])
            .map_err(|e| Error::Inference(format!("model run: {e}")))?;

        let (shape_out, data_out) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::Inference(format!("output tensor: {e}")))?;

        let dims: Vec<usize> = shape_out.iter().map(|&x| x as usize).collect();
        let array_view = ArrayViewD::from_shape(IxDyn(&dims), data_out)
            .map_err(|e| Error::Inference(format!("output shape: {e}")))?;
        let view = array_view.index_axis(Axis(0), 0);

        let num_candidates = view.shape()[1];
        let sx = rgb.width() as f32 / imgsz as f32;
        let sy = rgb.height() as f32 / imgsz as f32;

        let mut detections = Vec::new();
        for i in 0..num_candidates {
            let scores = view.slice(s![4.., i]);
            let Some((class_id, &max_score)) = scores
                .indexed_iter()
                .max_by(|(_, a), (_, b)| a.total_cmp(b))
            else {
                continue;
            };

            if max_score >= threshold {
                let cx = view[[0, i]];
                let cy = view[[1, i]];
                let w = view[[2, i]];
                let h = view[[3, i]];

                detections.push(RawDetection {
                    label: COCO_CLASSES
                        .get(class_id)
                        .copied()
                        .unwrap_or("object")
                        .to_string(),
                    confidence: max_score,
                    x1: (cx - w / 2.0) * sx,
                    y1: (cy - h / 2.0) * sy,
                    x2: (cx + w / 2.0) * sx,
                    y2: (cy + h / 2.0) * sy,
                });
            }
        }

        detections.sort_unstable_by(|a, b| b.confidence.total_cmp(&a.confidence));
        detections.truncate(MAX_DETECTIONS);
        Ok(detections)
    }
}

impl InferenceEngine for OnnxYoloEngine {
    fn infer(
        &self,
        image: &RgbImage,
        threshold: f32,
        input_size: Option<u32>,
    ) -> Result<Vec<RawDetection>> {
        if !self.is_ready() {
            return Err(Error::ModelUnavailable(format!(
                "{} did not finish initializing",
                self.name
            )));
        }
        self.run_inference(image, threshold, input_size)
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn uses_gpu(&self) -> bool {
        self.gpu
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}
