//! Lock-free shared confidence threshold
//!
//! One cell per session, written by the side-channel handler and read by
//! the pipeline once per frame. Relaxed ordering is enough: a frame already
//! in flight may use the previous value, which is the documented staleness
//! of last-write-wins.

use std::sync::atomic::{AtomicU32, Ordering};

/// Shared confidence threshold in [0, 1], stored as f32 bits.
#[derive(Debug)]
pub struct ThresholdCell {
    bits: AtomicU32,
}

impl ThresholdCell {
    /// Create a cell with an initial threshold, clamped to [0, 1].
    pub fn new(initial: f32) -> Self {
        Self {
            bits: AtomicU32::new(Self::sanitize(initial).to_bits()),
        }
    }

    /// Current threshold.
    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Update the threshold. Values are clamped to [0, 1]; non-finite
    /// values are ignored.
    pub fn set(&self, value: f32) {
        if !value.is_finite() {
            return;
        }
        self.bits
            .store(Self::sanitize(value).to_bits(), Ordering::Relaxed);
    }

    fn sanitize(value: f32) -> f32 {
        if value.is_finite() {
            value.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_value() {
        let cell = ThresholdCell::new(0.25);
        assert_eq!(cell.get(), 0.25);
    }

    #[test]
    fn test_set_then_get() {
        let cell = ThresholdCell::new(0.25);
        cell.set(0.7);
        assert_eq!(cell.get(), 0.7);
        cell.set(0.7);
        assert_eq!(cell.get(), 0.7);
    }

    #[test]
    fn test_out_of_range_clamped() {
        let cell = ThresholdCell::new(2.0);
        assert_eq!(cell.get(), 1.0);
        cell.set(-0.5);
        assert_eq!(cell.get(), 0.0);
        cell.set(1.5);
        assert_eq!(cell.get(), 1.0);
    }

    #[test]
    fn test_non_finite_ignored() {
        let cell = ThresholdCell::new(0.5);
        cell.set(f32::NAN);
        assert_eq!(cell.get(), 0.5);
        cell.set(f32::INFINITY);
        assert_eq!(cell.get(), 0.5);
    }

    #[test]
    fn test_shared_across_threads() {
        use std::sync::Arc;
        let cell = Arc::new(ThresholdCell::new(0.25));
        let writer = {
            let cell = cell.clone();
            std::thread::spawn(move || cell.set(0.9))
        };
        writer.join().unwrap();
        assert_eq!(cell.get(), 0.9);
    }
}
