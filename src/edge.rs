// edge.rs — The single-channel edge-detector capability.
//
// The pipeline only needs one operation from an image-processing library:
// "detect edges in a single-channel buffer, given two thresholds, producing
// a same-size single-channel buffer". `EdgeDetector` is that seam. The
// in-crate `CannyDetector` implements it; tests swap in trivial detectors
// to exercise the pipeline without depending on the algorithm.

use crate::image::{Image, ImageView};

/// Value written for edge pixels. Non-edge pixels are 0.
pub const EDGE: u8 = 255;

/// Hysteresis thresholds, in gradient-magnitude units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub low: f32,
    pub high: f32,
}

impl Thresholds {
    /// The fixed thresholds used by the live viewer.
    pub const CANONICAL: Thresholds = Thresholds { low: 80.0, high: 100.0 };

    pub fn new(low: f32, high: f32) -> Self {
        Thresholds { low, high }
    }

    /// `(low, high)` with `low <= high`. Swapped thresholds are accepted
    /// and reordered rather than rejected.
    pub fn ordered(self) -> (f32, f32) {
        if self.low <= self.high {
            (self.low, self.high)
        } else {
            (self.high, self.low)
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::CANONICAL
    }
}

/// A single-channel edge detector.
///
/// `&mut self` lets implementations keep scratch buffers (gradient planes,
/// hysteresis stacks) alive across frames. `Send` is required because the
/// detector lives inside the pipeline, which runs on the camera thread.
pub trait EdgeDetector: Send {
    /// Detect edges in `src`, writing the result into `dst`.
    ///
    /// `dst` must be resized to exactly `src.width() × src.height()` and
    /// every pixel overwritten. Output is single-channel; edge pixels are
    /// nonzero.
    fn detect(&mut self, src: &ImageView<'_, u8>, thresholds: Thresholds, dst: &mut Image<u8>);
}

impl<D: EdgeDetector + ?Sized> EdgeDetector for Box<D> {
    fn detect(&mut self, src: &ImageView<'_, u8>, thresholds: Thresholds, dst: &mut Image<u8>) {
        (**self).detect(src, thresholds, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_thresholds() {
        assert_eq!(Thresholds::default(), Thresholds::new(80.0, 100.0));
    }

    #[test]
    fn test_ordered_swaps() {
        assert_eq!(Thresholds::new(100.0, 80.0).ordered(), (80.0, 100.0));
        assert_eq!(Thresholds::new(10.0, 20.0).ordered(), (10.0, 20.0));
    }
}
