//! Per-connection annotation pipeline
//!
//! One pipeline per session: frames are pulled from the source in order,
//! annotated off the event loop, and pushed to the sink. Exactly one frame
//! is in flight at a time, so output order is input order and a slow model
//! backpressures the stream instead of queueing frames.

use crate::annotate::{annotate_frame, draw_fps};
use crate::channels::{FrameStats, MetadataPublisher};
use crate::detect::SharedEngine;
use crate::media::{ensure_min_height, FrameSink, FrameSource, VideoFrame};
use crate::session::ThresholdCell;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Pipeline lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Spawned, no frame processed yet
    Starting,
    /// At least one frame has flowed through
    Running,
    /// Terminated; no further frames will be produced
    Stopped,
}

/// Builder for a session's annotation pipeline.
pub struct AnnotationPipeline {
    engine: SharedEngine,
    threshold: Arc<ThresholdCell>,
    publisher: MetadataPublisher,
    min_output_height: u32,
    publish_empty_detections: bool,
}

impl AnnotationPipeline {
    pub fn new(
        engine: SharedEngine,
        threshold: Arc<ThresholdCell>,
        publisher: MetadataPublisher,
        min_output_height: u32,
        publish_empty_detections: bool,
    ) -> Self {
        Self {
            engine,
            threshold,
            publisher,
            min_output_height,
            publish_empty_detections,
        }
    }

    /// Start the pipeline task over the given source and sink.
    pub fn spawn(
        self,
        source: impl FrameSource + 'static,
        sink: impl FrameSink + 'static,
    ) -> PipelineHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(PipelineState::Starting);
        let task = tokio::spawn(self.run(source, sink, stop_rx, state_tx));
        PipelineHandle {
            stop_tx,
            state_rx,
            task,
        }
    }

    async fn run(
        self,
        mut source: impl FrameSource,
        mut sink: impl FrameSink,
        mut stop_rx: watch::Receiver<bool>,
        state_tx: watch::Sender<PipelineState>,
    ) {
        let mut frame_count: u64 = 0;
        let mut started_at: Option<Instant> = None;

        loop {
            let pulled = tokio::select! {
                biased;
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        debug!("pipeline stop requested");
                        break;
                    }
                    continue;
                }
                pulled = source.next_frame() => pulled,
            };

            let frame = match pulled {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!("frame source drained");
                    break;
                }
                Err(e) => {
                    warn!("frame source failed: {e}");
                    break;
                }
            };

            let started = *started_at.get_or_insert_with(Instant::now);
            if frame_count == 0 {
                let _ = state_tx.send(PipelineState::Running);
            }

            let VideoFrame {
                image,
                pts,
                time_base,
            } = frame;
            let threshold = self.threshold.get();
            let engine = self.engine.clone();

            // Inference stays off the event loop. Exactly one frame is in
            // flight; the next pull waits for this one to finish.
            let annotated = tokio::task::spawn_blocking(move || {
                let mut image = image;
                let detections = annotate_frame(&mut image, engine.as_ref(), threshold);
                (image, detections)
            })
            .await;

            // A stop that arrived during inference discards the in-flight
            // result; nothing reaches the sink after the signal.
            if *stop_rx.borrow() {
                debug!("pipeline stopped during inference, discarding frame");
                break;
            }

            let (mut image, detections) = match annotated {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("annotation task panicked, stopping pipeline: {e}");
                    break;
                }
            };

            frame_count += 1;
            let elapsed = started.elapsed().as_secs_f64();
            let fps = if elapsed > 0.0 {
                frame_count as f64 / elapsed
            } else {
                0.0
            };

            // Metadata carries the detection-time dimensions, before any
            // output upscale
            let (img_w, img_h) = (image.width(), image.height());
            draw_fps(&mut image, fps);

            if !detections.is_empty() || self.publish_empty_detections {
                let stats = FrameStats::now(fps, img_w, img_h, frame_count, detections);
                self.publisher.publish(&stats).await;
            }

            let image = ensure_min_height(image, self.min_output_height);
            let out = VideoFrame {
                image,
                pts,
                time_base,
            };
            if let Err(e) = sink.send_frame(out).await {
                warn!("frame sink failed, stopping pipeline: {e}");
                break;
            }
        }

        info!(frames = frame_count, "pipeline stopped");
        let _ = state_tx.send(PipelineState::Stopped);
    }
}

/// Running pipeline handle.
pub struct PipelineHandle {
    stop_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<PipelineState>,
    task: JoinHandle<()>,
}

impl PipelineHandle {
    /// Signal the pipeline to stop. Observed at the next suspension point;
    /// idempotent.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Current lifecycle state
    pub fn state(&self) -> PipelineState {
        *self.state_rx.borrow()
    }

    /// Wait for the pipeline task to finish.
    pub async fn wait(self) {
        let _ = self.task.await;
    }

    /// Stop and wait.
    pub async fn shutdown(self) {
        self.stop();
        let _ = self.task.await;
    }
}
