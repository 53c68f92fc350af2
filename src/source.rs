// source.rs — Frame sources standing in for the camera.
//
// A `FrameSource` fills a caller-owned buffer with one NV21 frame at a time,
// the same contract a camera preview callback has: the bytes are valid until
// the next call, and the consumer must not keep them.
//
// Two sources:
//   SyntheticCamera — procedurally generated scene (gradient background with
//                     a moving bright rectangle). Deterministic, no I/O.
//   ImageSequence   — a directory of PNG/JPEG files decoded with `image`,
//                     converted to luminance and wrapped as NV21.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::convert::luma_to_nv21;
use crate::image::Image;
use crate::LOG_TAG;

/// Producer of camera-like NV21 frames.
pub trait FrameSource: Send {
    /// Write the next frame into `buf` and return its dimensions, or `None`
    /// when the source is exhausted.
    fn next_frame(&mut self, buf: &mut Vec<u8>) -> Option<(usize, usize)>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self, buf: &mut Vec<u8>) -> Option<(usize, usize)> {
        (**self).next_frame(buf)
    }
}

// ============================================================
// Synthetic camera
// ============================================================

/// Procedural scene: a horizontal luminance ramp with a bright rectangle
/// that moves diagonally and bounces off the borders.
pub struct SyntheticCamera {
    width: usize,
    height: usize,
    frame: u64,
    /// Stop after this many frames (`None` = endless).
    limit: Option<u64>,
    luma: Image<u8>,
}

impl SyntheticCamera {
    pub fn new(width: usize, height: usize) -> Self {
        SyntheticCamera {
            width,
            height,
            frame: 0,
            limit: None,
            luma: Image::new(width, height),
        }
    }

    /// Stop producing frames after `frames` calls.
    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    /// Top-left corner and size of the rectangle in frame `n`.
    fn rect_at(&self, n: u64) -> (usize, usize, usize, usize) {
        let rw = (self.width / 4).max(1);
        let rh = (self.height / 4).max(1);
        let span_x = self.width.saturating_sub(rw) as u64;
        let span_y = self.height.saturating_sub(rh) as u64;
        (bounce(n * 3, span_x), bounce(n * 2, span_y), rw, rh)
    }

    fn render(&mut self) {
        let (rx, ry, rw, rh) = self.rect_at(self.frame);
        let w = self.width;
        for y in 0..self.height {
            let row = self.luma.row_mut(y);
            for (x, px) in row.iter_mut().enumerate() {
                let inside = x >= rx && x < rx + rw && y >= ry && y < ry + rh;
                *px = if inside { 240 } else { (x * 96 / w.max(1)) as u8 + 16 };
            }
        }
    }
}

/// Triangle wave over `0..=span`.
fn bounce(t: u64, span: u64) -> usize {
    if span == 0 {
        return 0;
    }
    let period = 2 * span;
    let p = t % period;
    (if p <= span { p } else { period - p }) as usize
}

impl FrameSource for SyntheticCamera {
    fn next_frame(&mut self, buf: &mut Vec<u8>) -> Option<(usize, usize)> {
        if self.limit.is_some_and(|limit| self.frame >= limit) {
            return None;
        }
        self.render();
        luma_to_nv21(&self.luma, buf);
        self.frame += 1;
        Some((self.width, self.height))
    }
}

// ============================================================
// Image sequence
// ============================================================

/// Errors opening an image sequence.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read image directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no PNG or JPEG images in {0}")]
    Empty(PathBuf),
}

/// Sorted list of still images replayed as camera frames.
pub struct ImageSequence {
    files: Vec<PathBuf>,
    next: usize,
    looping: bool,
}

impl ImageSequence {
    /// Collect `*.png`, `*.jpg` and `*.jpeg` files in `dir`, sorted by name.
    pub fn open(dir: &Path) -> Result<Self, SourceError> {
        let entries = fs::read_dir(dir).map_err(|source| SourceError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| is_supported_image(p))
            .collect();
        if files.is_empty() {
            return Err(SourceError::Empty(dir.to_path_buf()));
        }
        files.sort();
        debug!(target: LOG_TAG, "image sequence: {} files in {}", files.len(), dir.display());
        Ok(ImageSequence { files, next: 0, looping: false })
    }

    /// Restart from the first image instead of ending.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
        .unwrap_or(false)
}

/// Decode an image file to 8-bit luminance.
pub fn load_luminance(path: &Path) -> Result<Image<u8>, image::ImageError> {
    let gray = image::open(path)?.to_luma8();
    let (w, h) = gray.dimensions();
    Ok(Image::from_vec(w as usize, h as usize, gray.into_raw()))
}

impl FrameSource for ImageSequence {
    fn next_frame(&mut self, buf: &mut Vec<u8>) -> Option<(usize, usize)> {
        // Each file is tried at most once per call; undecodable files are
        // skipped with a warning.
        for _ in 0..self.files.len() {
            if self.next >= self.files.len() {
                if !self.looping {
                    return None;
                }
                self.next = 0;
            }
            let path = &self.files[self.next];
            self.next += 1;
            match load_luminance(path) {
                Ok(luma) if !luma.is_empty() => {
                    luma_to_nv21(&luma, buf);
                    return Some((luma.width(), luma.height()));
                }
                Ok(_) => warn!(target: LOG_TAG, "skipping empty image {}", path.display()),
                Err(e) => warn!(target: LOG_TAG, "skipping {}: {e}", path.display()),
            }
        }
        None
    }
}
