// canny.rs — Canny edge detector.
//
// Pipeline:
//   1. Sobel gradients gx, gy (3×3, replicate border).
//   2. Magnitude: |gx| + |gy| (L1), or sqrt(gx² + gy²) with `l2_gradient`.
//   3. Non-maximum suppression along the quantized gradient direction.
//      Directions are bucketed into 4 sectors using tan(22.5°) without
//      calling atan2:
//
//        |gy| < |gx|·tan22.5          → horizontal: compare left/right
//        |gy| > |gx|·tan67.5          → vertical:   compare up/down
//        otherwise                    → diagonal:   compare the two corners
//                                        along the gradient sign
//
//      A pixel survives if it is strictly greater than the neighbour
//      "before" it and greater-or-equal to the neighbour "after" it. The
//      asymmetric comparison keeps exactly one pixel of a two-pixel plateau,
//      so symmetric step edges still produce a one-pixel-wide line.
//      Neighbours outside the image count as zero magnitude.
//   4. Hysteresis: magnitude > high → strong; low < magnitude <= high →
//      weak. Strong pixels seed a flood fill over 8-connected weak pixels.
//
// Output: 255 for edge, 0 otherwise.

use crate::edge::{EdgeDetector, Thresholds, EDGE};
use crate::gradient::SobelGradients;
use crate::image::{Image, ImageView};

/// tan(22.5°)
const TAN_22_5: f32 = 0.414_213_57;

const NOT_EDGE: u8 = 0;
const WEAK: u8 = 1;
const STRONG: u8 = 2;

/// Canny detector configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CannyConfig {
    /// Use the Euclidean gradient norm instead of |gx| + |gy|.
    pub l2_gradient: bool,
}

/// Canny edge detector with per-frame scratch buffers.
///
/// Reusing one detector across frames avoids reallocating the gradient
/// planes, the magnitude plane and the classification map every frame.
#[derive(Default)]
pub struct CannyDetector {
    config: CannyConfig,
    gradients: SobelGradients,
    magnitude: Image<f32>,
    class: Vec<u8>,
    stack: Vec<usize>,
}

impl CannyDetector {
    pub fn new(config: CannyConfig) -> Self {
        CannyDetector {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> CannyConfig {
        self.config
    }

    /// Allocating convenience wrapper: detect edges into a new image.
    pub fn detect_image(&mut self, src: &ImageView<'_, u8>, thresholds: Thresholds) -> Image<u8> {
        let mut dst = Image::default();
        self.detect(src, thresholds, &mut dst);
        dst
    }

    fn compute_magnitude(&mut self, w: usize, h: usize) {
        self.magnitude.resize(w, h);
        for y in 0..h {
            for x in 0..w {
                let m = self.gradients.magnitude(x, y, self.config.l2_gradient);
                // SAFETY: x < w, y < h; magnitude was resized to (w, h).
                unsafe { self.magnitude.set_unchecked(x, y, m) };
            }
        }
    }

    /// Magnitude with zero outside the image.
    #[inline]
    fn mag_or_zero(&self, x: isize, y: isize) -> f32 {
        let (w, h) = (self.magnitude.width() as isize, self.magnitude.height() as isize);
        if x < 0 || y < 0 || x >= w || y >= h {
            0.0
        } else {
            self.magnitude.get(x as usize, y as usize)
        }
    }

    /// Non-maximum suppression test for the pixel at (x, y).
    fn is_local_max(&self, x: usize, y: usize) -> bool {
        let m = self.magnitude.get(x, y);
        let gx = self.gradients.gx.get(x, y);
        let gy = self.gradients.gy.get(x, y);
        let ax = gx.abs();
        let ay = gy.abs();
        let (x, y) = (x as isize, y as isize);

        let tan22x = ax * TAN_22_5;
        let (before, after) = if ay < tan22x {
            ((x - 1, y), (x + 1, y))
        } else if ay > tan22x + 2.0 * ax {
            // tan(67.5°) = tan(22.5°) + 2
            ((x, y - 1), (x, y + 1))
        } else {
            // Same sign: gradient points down-right (image y grows down).
            let s = if (gx < 0.0) != (gy < 0.0) { -1 } else { 1 };
            ((x - s, y - 1), (x + s, y + 1))
        };
        m > self.mag_or_zero(before.0, before.1) && m >= self.mag_or_zero(after.0, after.1)
    }
}

impl EdgeDetector for CannyDetector {
    fn detect(&mut self, src: &ImageView<'_, u8>, thresholds: Thresholds, dst: &mut Image<u8>) {
        let w = src.width();
        let h = src.height();
        dst.resize(w, h);
        dst.fill(0);
        if w == 0 || h == 0 {
            return;
        }

        let (low, high) = thresholds.ordered();

        self.gradients.compute(src);
        self.compute_magnitude(w, h);

        // --- Non-maximum suppression + double threshold ---
        self.class.clear();
        self.class.resize(w * h, NOT_EDGE);
        self.stack.clear();

        for y in 0..h {
            for x in 0..w {
                let m = self.magnitude.get(x, y);
                if m <= low || !self.is_local_max(x, y) {
                    continue;
                }
                let idx = y * w + x;
                if m > high {
                    self.class[idx] = STRONG;
                    self.stack.push(idx);
                } else {
                    self.class[idx] = WEAK;
                }
            }
        }

        // --- Hysteresis: grow strong edges through weak neighbours ---
        let out = dst.as_mut_slice();
        while let Some(idx) = self.stack.pop() {
            out[idx] = EDGE;
            let (x, y) = (idx % w, idx / w);
            for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                    let n = ny * w + nx;
                    if self.class[n] == WEAK {
                        self.class[n] = STRONG;
                        self.stack.push(n);
                    }
                }
            }
        }
    }
}
