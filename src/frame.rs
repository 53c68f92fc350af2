// frame.rs — Borrowed camera frames and zero-copy plane extraction.
//
// The camera delivers NV21: a full-resolution luminance (Y) plane followed
// by a half-height plane of interleaved V/U samples.
//
//   rows 0 .. height                 Y   (width bytes per row)
//   rows height .. height + height/2 VU  (width bytes per row)
//
// Treated as one (height + height/2) × width single-channel matrix, the
// luminance plane is simply the top `height` rows. `extract_luminance`
// returns exactly that: an ImageView over the first width*height bytes,
// with no copy and no allocation.

use thiserror::Error;

use crate::image::ImageView;

/// Errors describing a frame that does not match its declared geometry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame dimensions must be positive, got {width}×{height}")]
    EmptyDimensions { width: usize, height: usize },
    #[error("NV21 buffer for {width}×{height} needs {expected} bytes, got {actual}")]
    BufferTooShort {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },
    #[error("NV21 frame size overflows for {width}×{height}")]
    TooLarge { width: usize, height: usize },
}

/// Byte length of an NV21 frame: the Y plane plus one interleaved V/U pair
/// per 2×2 block. Equals `width * height * 3 / 2` for even dimensions.
pub fn nv21_len(width: usize, height: usize) -> usize {
    width * height + 2 * width.div_ceil(2) * height.div_ceil(2)
}

/// `nv21_len`, or `None` when the size does not fit in `usize`.
pub fn checked_nv21_len(width: usize, height: usize) -> Option<usize> {
    let luma = width.checked_mul(height)?;
    let chroma = width.div_ceil(2).checked_mul(height.div_ceil(2))?.checked_mul(2)?;
    luma.checked_add(chroma)
}

/// One camera frame, borrowed from the camera subsystem for the duration of
/// a single processing call.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
}

impl<'a> RawFrame<'a> {
    /// Wrap a camera buffer, checking it against the declared dimensions.
    pub fn new(data: &'a [u8], width: usize, height: usize) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::EmptyDimensions { width, height });
        }
        let expected =
            checked_nv21_len(width, height).ok_or(FrameError::TooLarge { width, height })?;
        if data.len() < expected {
            return Err(FrameError::BufferTooShort {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(RawFrame { data, width, height })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// The interleaved V/U plane as a `width × ceil(height/2)` view.
    pub fn chroma(&self) -> ImageView<'a, u8> {
        let y_len = self.width * self.height;
        let rows = self.height.div_ceil(2);
        let row_bytes = 2 * self.width.div_ceil(2);
        ImageView::from_slice(&self.data[y_len..], row_bytes, rows, row_bytes)
    }
}

/// Zero-copy view of the luminance plane.
///
/// The returned view aliases the first `width * height` bytes of the frame
/// with stride equal to the frame width. Its lifetime is the frame's buffer
/// lifetime, so it cannot be kept once the camera reclaims the buffer.
pub fn extract_luminance<'a>(frame: &RawFrame<'a>) -> ImageView<'a, u8> {
    let y_len = frame.width * frame.height;
    ImageView::from_slice(&frame.data[..y_len], frame.width, frame.height, frame.width)
}
