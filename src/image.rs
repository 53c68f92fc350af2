// image.rs — Runtime-sized image container and borrowed views.
//
// Two types:
//
//   Image<T>          owned, heap-allocated, row-major with explicit stride.
//                     Used for the edge map (the published result) and for
//                     intermediate gradient planes.
//
//   ImageView<'a, T>  non-owning window into someone else's bytes. The
//                     luminance plane of a camera frame is an ImageView over
//                     the camera's buffer: no copy, and the borrow checker
//                     guarantees the view cannot outlive that buffer.
//
// Memory layout (stride = 5, width = 4):
//
//   data index:  0  1  2  3 [4]  5  6  7  8 [9] 10 11 12 13 [14]
//   pixel:       ■  ■  ■  ■  ·   ■  ■  ■  ■  ·   ■  ■  ■  ■  ·
//   row:         |--- row 0 ---|  |--- row 1 ---|  |--- row 2 ---|
//
// For an NV21 frame the stride of the luminance view equals the frame width,
// and the rows after `height` belong to the chroma plane; the view simply
// never indexes them.

use std::fmt;

// ---------------------------------------------------------------------------
// Pixel Trait
// ---------------------------------------------------------------------------

/// Trait for types that can serve as pixel values in an Image.
///
/// `Send + Sync + 'static` lets images cross the producer/consumer boundary
/// inside an `Arc` snapshot.
pub trait Pixel: Copy + Default + Send + Sync + PartialOrd + 'static {
    /// Convert this pixel value to f32 (raw, not normalized).
    fn to_f32(self) -> f32;

    /// Construct a pixel from an f32 value (with appropriate clamping/rounding).
    fn from_f32(v: f32) -> Self;
}

impl Pixel for u8 {
    #[inline]
    fn to_f32(self) -> f32 {
        // Raw cast: gradient thresholds (80/100) are in raw intensity units.
        self as f32
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v.clamp(0.0, 255.0).round() as u8
    }
}

impl Pixel for f32 {
    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v
    }
}

// ---------------------------------------------------------------------------
// Image<T>
// ---------------------------------------------------------------------------

/// A 2D image with runtime dimensions, generic over pixel type `T`.
pub struct Image<T: Pixel> {
    /// Pixel data in row-major order. Length = height * stride.
    data: Vec<T>,
    width: usize,
    height: usize,
    /// Row stride in *elements* (not bytes). stride >= width.
    stride: usize,
}

// Manual Clone: a deep copy of the pixel buffer, never implicit.
impl<T: Pixel> Clone for Image<T> {
    fn clone(&self) -> Self {
        Image {
            data: self.data.clone(),
            width: self.width,
            height: self.height,
            stride: self.stride,
        }
    }
}

impl<T: Pixel> Default for Image<T> {
    /// A 0×0 image. Nothing is allocated until the first `resize`.
    fn default() -> Self {
        Image {
            data: Vec::new(),
            width: 0,
            height: 0,
            stride: 0,
        }
    }
}

impl<T: Pixel> Image<T> {
    /// Create a zero-initialized image. Stride equals width.
    pub fn new(width: usize, height: usize) -> Self {
        Image {
            data: vec![T::default(); width * height],
            width,
            height,
            stride: width,
        }
    }

    /// Create an image from an existing pixel vector (stride = width).
    ///
    /// # Panics
    /// Panics if `data.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "data length ({}) must equal width * height ({})",
            data.len(),
            width * height,
        );
        Image {
            data,
            width,
            height,
            stride: width,
        }
    }

    /// Create an image where every pixel has the same value.
    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Image {
            data: vec![value; width * height],
            width,
            height,
            stride: width,
        }
    }

    // --- Accessors ---

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// True for a 0×0 (or degenerate) image.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Get the pixel value at (x, y). x is column, y is row.
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.bounds_check(x, y);
        self.data[y * self.stride + x]
    }

    /// Get pixel value without bounds checking.
    ///
    /// # Safety
    /// Caller must guarantee x < width and y < height.
    #[inline(always)]
    pub unsafe fn get_unchecked(&self, x: usize, y: usize) -> T {
        debug_assert!(x < self.width && y < self.height,
            "get_unchecked({x},{y}) out of bounds for {}x{}", self.width, self.height);
        *self.data.get_unchecked(y * self.stride + x)
    }

    /// Set pixel value without bounds checking.
    ///
    /// # Safety
    /// Caller must guarantee x < width and y < height.
    #[inline(always)]
    pub unsafe fn set_unchecked(&mut self, x: usize, y: usize, value: T) {
        debug_assert!(x < self.width && y < self.height);
        *self.data.get_unchecked_mut(y * self.stride + x) = value;
    }

    /// Set the pixel at (x, y) to the given value.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        self.bounds_check(x, y);
        let idx = y * self.stride + x;
        self.data[idx] = value;
    }

    /// Borrow a single row (active pixels only, no stride padding).
    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    /// Mutable borrow of a single row.
    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.stride;
        &mut self.data[start..start + self.width]
    }

    /// Borrow the whole image as an `ImageView`.
    pub fn view(&self) -> ImageView<'_, T> {
        ImageView {
            data: &self.data,
            width: self.width,
            height: self.height,
            stride: self.stride,
        }
    }

    /// Borrow a rectangular sub-region as an `ImageView`.
    ///
    /// # Panics
    /// Panics if the sub-region extends beyond image bounds.
    pub fn sub_image(&self, x: usize, y: usize, w: usize, h: usize) -> ImageView<'_, T> {
        self.view().sub_view(x, y, w, h)
    }

    /// Change the dimensions, keeping stride == width.
    ///
    /// The backing `Vec` is only reallocated when it has to grow, so an
    /// edge-map buffer that is republished at a constant frame size never
    /// allocates after the first frame. Pixel contents are unspecified
    /// after a size change; callers overwrite every pixel.
    pub fn resize(&mut self, width: usize, height: usize) {
        if width == self.width && height == self.height && self.stride == width {
            return;
        }
        self.data.resize(width * height, T::default());
        self.width = width;
        self.height = height;
        self.stride = width;
    }

    /// Set every pixel to `value`.
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Iterate over all pixels as `(x, y, value)` tuples.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        (0..self.height).flat_map(move |y| {
            (0..self.width).map(move |x| (x, y, self.data[y * self.stride + x]))
        })
    }

    /// Access the underlying data as a flat slice (including stride padding).
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Mutable access to the underlying data.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    #[inline]
    fn bounds_check(&self, x: usize, y: usize) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for image {}×{}",
            self.width,
            self.height,
        );
    }
}

impl<T: Pixel + PartialEq> PartialEq for Image<T> {
    /// Pixel-wise equality; stride padding is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && (0..self.height).all(|y| self.row(y) == other.row(y))
    }
}

impl<T: Pixel + fmt::Debug> fmt::Debug for Image<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Image<{}> {{ {}×{}, stride={} }}",
            std::any::type_name::<T>(),
            self.width,
            self.height,
            self.stride,
        )?;
        fmt_rows(f, self.height, self.width, |x, y| self.get(x, y))
    }
}

// ---------------------------------------------------------------------------
// ImageView<'a, T>
// ---------------------------------------------------------------------------
//
// The `'a` ties the view to whatever owns the bytes. For a camera frame that
// is the slice handed to `EdgePipeline::process_frame`; once that call
// returns the slice is gone, and so is every view derived from it. There is
// no way to stash an ImageView in a struct that outlives the call without
// the compiler rejecting it.

/// A borrowed, read-only view of a rectangular pixel region.
#[derive(Clone, Copy)]
pub struct ImageView<'a, T: Pixel> {
    /// Slice starting at the view's (0, 0) pixel.
    data: &'a [T],
    width: usize,
    height: usize,
    /// Elements between the starts of consecutive rows in `data`.
    stride: usize,
}

impl<'a, T: Pixel> ImageView<'a, T> {
    /// Wrap an existing slice as a `width × height` view with the given
    /// row stride. Nothing is copied.
    ///
    /// # Panics
    /// Panics if `stride < width` or `data` is too short to hold `height`
    /// rows at `stride`.
    pub fn from_slice(data: &'a [T], width: usize, height: usize, stride: usize) -> Self {
        assert!(stride >= width, "stride ({stride}) must be >= width ({width})");
        let needed = if height == 0 { 0 } else { (height - 1) * stride + width };
        assert!(
            data.len() >= needed,
            "slice of {} elements too short for {width}×{height} view at stride {stride} \
             (needs {needed})",
            data.len(),
        );
        ImageView {
            data,
            width,
            height,
            stride,
        }
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
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Get the pixel at (x, y) within the view's coordinate system.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        assert!(
            x < self.width && y < self.height,
            "ImageView pixel ({x},{y}) out of bounds for view {}×{}",
            self.width,
            self.height,
        );
        self.data[y * self.stride + x]
    }

    /// # Safety
    /// Caller must guarantee x < width and y < height.
    #[inline(always)]
    pub unsafe fn get_unchecked(&self, x: usize, y: usize) -> T {
        debug_assert!(x < self.width && y < self.height);
        *self.data.get_unchecked(y * self.stride + x)
    }

    /// Borrow one row. The returned slice lives as long as the source
    /// buffer, not just as long as this view.
    #[inline]
    pub fn row(&self, y: usize) -> &'a [T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    /// A nested view; coordinates are relative to this view.
    pub fn sub_view(&self, x: usize, y: usize, w: usize, h: usize) -> ImageView<'a, T> {
        assert!(
            x + w <= self.width && y + h <= self.height,
            "sub-region ({x},{y},{w},{h}) exceeds view bounds ({},{})",
            self.width,
            self.height,
        );
        let start = y * self.stride + x;
        let end = if h == 0 { start } else { (y + h - 1) * self.stride + x + w };
        ImageView {
            data: &self.data[start..end],
            width: w,
            height: h,
            stride: self.stride,
        }
    }

    /// Iterate over all pixels in the view as `(x, y, value)`.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, T)> + 'a {
        let view = *self;
        (0..view.height).flat_map(move |y| {
            (0..view.width).map(move |x| (x, y, view.data[y * view.stride + x]))
        })
    }

    /// Copy the view's pixels into a new owned Image.
    pub fn to_owned_image(&self) -> Image<T> {
        let mut data = Vec::with_capacity(self.width * self.height);
        for y in 0..self.height {
            data.extend_from_slice(self.row(y));
        }
        Image::from_vec(self.width, self.height, data)
    }
}

impl<'a, T: Pixel + fmt::Debug> fmt::Debug for ImageView<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ImageView<{}> {{ {}×{}, stride={} }}",
            std::any::type_name::<T>(),
            self.width,
            self.height,
            self.stride,
        )?;
        fmt_rows(f, self.height, self.width, |x, y| self.get(x, y))
    }
}

/// Shared Debug body: first 8 rows, first 16 columns.
fn fmt_rows<T: fmt::Debug>(
    f: &mut fmt::Formatter<'_>,
    height: usize,
    width: usize,
    get: impl Fn(usize, usize) -> T,
) -> fmt::Result {
    for y in 0..height.min(8) {
        write!(f, "  row {y}: [")?;
        for x in 0..width.min(16) {
            if x > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:?}", get(x, y))?;
        }
        if width > 16 {
            write!(f, ", ...")?;
        }
        writeln!(f, "]")?;
    }
    if height > 8 {
        writeln!(f, "  ...")?;
    }
    Ok(())
}
