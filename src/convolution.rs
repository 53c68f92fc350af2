// convolution.rs — Separable 1D convolution over image views.
//
// A 2D kernel K = k_col * k_row^T decomposes into a horizontal pass followed
// by a vertical pass, O(2k) per pixel instead of O(k²). The Sobel operators
// used by the edge detector are separable 3-tap kernels.
//
// BORDER HANDLING: Clamp (replicate edge pixels). When the kernel window
// extends beyond the image, out-of-bounds indices are clamped to the nearest
// edge pixel, the same as GPU clamp-to-edge sampling.
//
// Both passes write into caller-owned `Image<f32>` scratch buffers so a
// detector running once per camera frame can reuse its allocations.

use crate::image::{Image, ImageView, Pixel};

/// Convolve each row of `src` with a 1D kernel (horizontal pass) into `dst`.
///
/// `dst` is resized to the source dimensions. The kernel is centered: for a
/// kernel of length K the center element is at index K/2.
///
/// # Panics
/// Panics if the kernel is empty or has even length.
pub fn convolve_rows_into<T: Pixel>(src: &ImageView<'_, T>, kernel: &[f32], dst: &mut Image<f32>) {
    check_kernel(kernel);
    let w = src.width();
    let h = src.height();
    let half = kernel.len() / 2;
    dst.resize(w, h);
    if w == 0 {
        return;
    }

    for y in 0..h {
        let row = src.row(y);
        let out = dst.row_mut(y);

        // Interior: x in [half, w - half) never touches the border.
        if w > 2 * half {
            for x in half..(w - half) {
                let window = &row[x - half..=x + half];
                out[x] = window
                    .iter()
                    .zip(kernel)
                    .map(|(&p, &k)| p.to_f32() * k)
                    .sum();
            }
        }

        // Borders: clamped access on both sides.
        let left_end = half.min(w);
        let right_start = w.saturating_sub(half).max(left_end);
        for x in (0..left_end).chain(right_start..w) {
            out[x] = clamped_tap(kernel, x, w, |sx| row[sx].to_f32());
        }
    }
}

/// Convolve each column of `src` with a 1D kernel (vertical pass) into `dst`.
///
/// # Panics
/// Panics if the kernel is empty or has even length.
pub fn convolve_cols_into(src: &Image<f32>, kernel: &[f32], dst: &mut Image<f32>) {
    check_kernel(kernel);
    let w = src.width();
    let h = src.height();
    let half = kernel.len() / 2;
    dst.resize(w, h);
    if h == 0 {
        return;
    }

    for y in 0..h {
        let interior = y >= half && y + half < h;
        for x in 0..w {
            let acc = if interior {
                let mut acc = 0.0f32;
                for (ki, &kv) in kernel.iter().enumerate() {
                    // SAFETY: y - half >= 0 and y + half < h.
                    acc += unsafe { src.get_unchecked(x, y + ki - half) } * kv;
                }
                acc
            } else {
                clamped_tap(kernel, y, h, |sy| src.get(x, sy))
            };
            // SAFETY: x < w and y < h; dst was resized to (w, h).
            unsafe { dst.set_unchecked(x, y, acc) };
        }
    }
}

/// Full separable 2D convolution: horizontal pass then vertical pass.
///
/// `tmp` holds the intermediate row-filtered plane; `dst` receives the
/// result. Both are resized to the source dimensions.
pub fn convolve_separable_into<T: Pixel>(
    src: &ImageView<'_, T>,
    kernel_row: &[f32],
    kernel_col: &[f32],
    tmp: &mut Image<f32>,
    dst: &mut Image<f32>,
) {
    convolve_rows_into(src, kernel_row, tmp);
    convolve_cols_into(tmp, kernel_col, dst);
}

fn check_kernel(kernel: &[f32]) {
    assert!(!kernel.is_empty(), "kernel must not be empty");
    assert!(kernel.len() % 2 == 1, "kernel length must be odd (got {})", kernel.len());
}

/// One output sample with the kernel window clamped to `[0, len)`.
#[inline]
fn clamped_tap(kernel: &[f32], center: usize, len: usize, sample: impl Fn(usize) -> f32) -> f32 {
    let half = kernel.len() as isize / 2;
    kernel
        .iter()
        .enumerate()
        .map(|(ki, &kv)| {
            let s = (center as isize + ki as isize - half).clamp(0, len as isize - 1) as usize;
            sample(s) * kv
        })
        .sum()
}
