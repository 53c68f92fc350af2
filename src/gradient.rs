// gradient.rs — Image gradients via 3×3 Sobel operators.
//
// Sobel kernels are separable:
//   Sobel_x: row [-1, 0, 1] (derivative along x), col [1, 2, 1] (smooth along y)
//   Sobel_y: row [ 1, 2, 1] (smooth along x),     col [-1, 0, 1] (derivative along y)
//
// Built on convolve_separable_into, so border handling (replicate) is
// inherited. For a u8 source the response range is [-1020, 1020].

use crate::convolution::convolve_separable_into;
use crate::image::{Image, ImageView, Pixel};

const SOBEL_DERIV: [f32; 3] = [-1.0, 0.0, 1.0];
const SOBEL_SMOOTH: [f32; 3] = [1.0, 2.0, 1.0];

/// Reusable Sobel workspace: both gradient planes plus the intermediate
/// plane shared by the two separable passes.
///
/// `gx` is positive where intensity increases to the right, `gy` where it
/// increases downward.
#[derive(Default)]
pub struct SobelGradients {
    pub gx: Image<f32>,
    pub gy: Image<f32>,
    tmp: Image<f32>,
}

impl SobelGradients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute `gx` and `gy` for `src`. Buffers are resized, never
    /// reallocated while the frame size stays constant.
    pub fn compute<T: Pixel>(&mut self, src: &ImageView<'_, T>) {
        convolve_separable_into(src, &SOBEL_DERIV, &SOBEL_SMOOTH, &mut self.tmp, &mut self.gx);
        convolve_separable_into(src, &SOBEL_SMOOTH, &SOBEL_DERIV, &mut self.tmp, &mut self.gy);
    }

    /// Gradient magnitude at (x, y): `|gx| + |gy|`, or the Euclidean norm
    /// when `l2` is set.
    #[inline]
    pub fn magnitude(&self, x: usize, y: usize, l2: bool) -> f32 {
        let dx = self.gx.get(x, y);
        let dy = self.gy.get(x, y);
        if l2 {
            (dx * dx + dy * dy).sqrt()
        } else {
            dx.abs() + dy.abs()
        }
    }
}
