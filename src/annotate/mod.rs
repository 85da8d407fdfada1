//! Frame annotation
//!
//! Runs detection on a frame and burns the results into the pixels:
//! severity-colored boxes, label tags with confidence, and an FPS readout.
//! Annotation is deliberately infallible at this boundary: an inference
//! failure degrades the frame to a pass-through instead of stalling the
//! stream.

pub mod draw;

use crate::detect::{Detection, InferenceEngine};
use draw::{draw_rect, draw_text, fill_rect, text_width, GLYPH_HEIGHT};
use image::{Rgb, RgbImage};
use tracing::warn;

/// Box stroke thickness in pixels
const BOX_THICKNESS: u32 = 2;

/// Padding inside label backgrounds
const LABEL_PAD: i32 = 2;

/// Run detection and draw the overlay in place.
///
/// Returns the detections that were drawn, already converted to wire shape
/// against this frame's dimensions. On inference failure the frame is left
/// unmodified and an empty list is returned.
pub fn annotate_frame(
    image: &mut RgbImage,
    engine: &dyn InferenceEngine,
    threshold: f32,
) -> Vec<Detection> {
    let raw = match engine.infer(image, threshold, None) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("inference failed, passing frame through: {e}");
            return Vec::new();
        }
    };

    let (w, h) = (image.width(), image.height());
    let detections: Vec<Detection> = raw.iter().map(|r| Detection::from_raw(r, w, h)).collect();

    for det in &detections {
        draw_detection(image, det);
    }
    detections
}

/// Draw one detection: tier-colored box plus a label tag above it.
fn draw_detection(image: &mut RgbImage, det: &Detection) {
    let color = Rgb(det.tier().color());
    let [x, y, w, h] = det.bbox_xywh;
    let (left, top) = (x.round() as i32, y.round() as i32);
    let (right, bottom) = ((x + w).round() as i32, (y + h).round() as i32);

    draw_rect(image, left, top, right, bottom, BOX_THICKNESS, color);

    let label = format!("{} {:.0}%", det.cls, det.conf * 100.0);
    let tag_h = GLYPH_HEIGHT + 2 * LABEL_PAD;
    // Tag sits above the box when there is room, inside it otherwise
    let tag_top = if top - tag_h >= 0 { top - tag_h } else { top };
    fill_rect(
        image,
        left,
        tag_top,
        left + text_width(&label) + 2 * LABEL_PAD,
        tag_top + tag_h,
        color,
    );
    draw_text(image, left + LABEL_PAD, tag_top + LABEL_PAD, &label, Rgb([0, 0, 0]));
}

/// Draw the FPS readout in the top-left corner.
pub fn draw_fps(image: &mut RgbImage, fps: f64) {
    let text = format!("FPS: {:.1}", fps);
    let tag_h = GLYPH_HEIGHT + 2 * LABEL_PAD;
    fill_rect(
        image,
        0,
        0,
        text_width(&text) + 2 * LABEL_PAD,
        tag_h,
        Rgb([0, 0, 0]),
    );
    draw_text(image, LABEL_PAD, LABEL_PAD, &text, Rgb([0, 255, 0]));
}
