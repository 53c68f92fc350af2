// convert.rs — Pixel format conversions at the edges of the pipeline.
//
//   luma  → NV21     (feeding still images and synthetic frames to the
//                     pipeline as if they came from the camera)
//   f32   → u8       (normalized [0, 1] → [0, 255], for clear colors)
//   RGBA8 → 0RGB u32 (framebuffer → window pixel buffer)
//
// NV21 chroma written here is neutral (128): the pipeline only reads the
// luminance plane, so the chroma plane just has to be the right size.

use crate::frame::nv21_len;
use crate::image::Image;

/// Neutral chroma value (zero color difference).
pub const NEUTRAL_CHROMA: u8 = 128;

/// Encode a luminance image as an NV21 buffer with neutral chroma.
///
/// `out` is resized to `nv21_len(width, height)`; its allocation is reused
/// across calls. Any stride padding in `src` is dropped.
pub fn luma_to_nv21(src: &Image<u8>, out: &mut Vec<u8>) {
    let (w, h) = (src.width(), src.height());
    out.clear();
    out.reserve(nv21_len(w, h));
    for y in 0..h {
        out.extend_from_slice(src.row(y));
    }
    out.resize(nv21_len(w, h), NEUTRAL_CHROMA);
}

/// Normalized float in [0, 1] to u8, clamped and rounded.
#[inline]
pub fn unorm_to_u8(v: f32) -> u8 {
    (v * 255.0).clamp(0.0, 255.0).round() as u8
}

/// Normalized RGBA color to RGBA8.
pub fn color_to_rgba8(color: [f32; 4]) -> [u8; 4] {
    color.map(unorm_to_u8)
}

/// Pack an RGBA8 framebuffer into 0RGB `u32` pixels (alpha dropped), the
/// layout window buffers expect.
pub fn rgba8_to_0rgb(rgba: &[u8], out: &mut Vec<u32>) {
    out.clear();
    out.extend(
        rgba.chunks_exact(4)
            .map(|p| (p[0] as u32) << 16 | (p[1] as u32) << 8 | p[2] as u32),
    );
}
