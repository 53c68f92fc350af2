// gpu/soft.rs — CPU implementation of GraphicsContext.
//
// Rasterizes the textured quad the way a GL/wgpu pipeline would:
//
//   - The 4-vertex strip is split into triangles (0,1,2) and (2,1,3).
//   - NDC maps onto the viewport with y up; framebuffer row 0 is the top.
//   - Pixels whose centre lies inside a triangle are shaded; texture
//     coordinates are interpolated barycentrically (no perspective, w = 1).
//   - Filter selection follows GL: the per-triangle scale factor ρ (texels
//     per pixel) picks the magnification filter when ρ ≤ 1 and the
//     minification filter otherwise.
//   - Wrap modes apply per axis; the fragment stage broadcasts the sampled
//     luminance to RGB with alpha 1.
//
// Texture names come from a `SoftDisplay`, which outlives contexts the way a
// driver outlives GL contexts. It tracks which textures and programs are
// still alive, so a test can check that surface loss released everything.

use std::collections::BTreeSet;
use std::sync::Arc;

use image::RgbaImage;
use parking_lot::Mutex;

use super::shader::{AttributeLocations, LinkedProgram};
use super::{
    FilterMode, GraphicsContext, Quad, RenderError, SamplerParams, TextureHandle, TextureId,
    WrapMode,
};
use crate::convert::color_to_rgba8;
use crate::image::Image;

// ============================================================
// Display: object names and liveness
// ============================================================

#[derive(Debug, Default)]
struct DisplayState {
    next_texture: u32,
    live_textures: BTreeSet<u32>,
    live_programs: usize,
}

/// Shared object namespace for software contexts.
#[derive(Debug, Clone, Default)]
pub struct SoftDisplay {
    state: Arc<Mutex<DisplayState>>,
}

impl SoftDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new context drawing into a `width × height` surface.
    pub fn create_context(&self, width: u32, height: u32) -> SoftContext {
        SoftContext {
            display: self.clone(),
            width,
            height,
            framebuffer: vec![0; width as usize * height as usize * 4],
            in_frame: false,
            enabled_attributes: Vec::new(),
            stats: SoftStats::default(),
        }
    }

    /// Textures created and not yet dropped, in id order.
    pub fn live_textures(&self) -> Vec<TextureId> {
        self.state.lock().live_textures.iter().map(|&id| TextureId(id)).collect()
    }

    pub fn live_programs(&self) -> usize {
        self.state.lock().live_programs
    }

    fn alloc_texture(&self) -> TextureId {
        let mut state = self.state.lock();
        // Names start at 1; 0 is never a valid texture.
        state.next_texture += 1;
        let id = state.next_texture;
        state.live_textures.insert(id);
        TextureId(id)
    }
}

// ============================================================
// Handles
// ============================================================

/// Program handle. The soft backend runs the fixed quad program natively;
/// the handle carries the reflected attribute slots.
///
/// Only the stage interfaces of the linked sources are used. Any fragment
/// stage that links renders as the built-in grayscale broadcast here; use
/// the wgpu backend to see a custom fragment stage's output.
#[derive(Debug)]
pub struct SoftProgram {
    display: SoftDisplay,
    attributes: AttributeLocations,
}

impl SoftProgram {
    pub fn attributes(&self) -> AttributeLocations {
        self.attributes
    }
}

impl Drop for SoftProgram {
    fn drop(&mut self) {
        self.display.state.lock().live_programs -= 1;
    }
}

/// Texture handle holding single-channel texels.
#[derive(Debug)]
pub struct SoftTexture {
    id: TextureId,
    display: SoftDisplay,
    sampler: SamplerParams,
    texels: Image<u8>,
}

impl SoftTexture {
    pub fn size(&self) -> (usize, usize) {
        (self.texels.width(), self.texels.height())
    }

    pub fn sampler(&self) -> SamplerParams {
        self.sampler
    }
}

impl TextureHandle for SoftTexture {
    fn id(&self) -> TextureId {
        self.id
    }
}

impl Drop for SoftTexture {
    fn drop(&mut self) {
        self.display.state.lock().live_textures.remove(&self.id.0);
    }
}

// ============================================================
// Context
// ============================================================

/// Per-context operation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SoftStats {
    pub frames: u64,
    pub uploads: u64,
    pub draws: u64,
}

/// Software rendering context with an RGBA8 framebuffer.
pub struct SoftContext {
    display: SoftDisplay,
    width: u32,
    height: u32,
    framebuffer: Vec<u8>,
    in_frame: bool,
    enabled_attributes: Vec<u32>,
    stats: SoftStats,
}

impl SoftContext {
    pub fn display(&self) -> &SoftDisplay {
        &self.display
    }

    pub fn stats(&self) -> SoftStats {
        self.stats
    }

    /// Attribute slots currently enabled. Always empty between draws.
    pub fn enabled_attributes(&self) -> &[u32] {
        &self.enabled_attributes
    }

    /// RGBA of the framebuffer pixel at column `x`, row `y` (top row 0).
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        assert!(x < self.width && y < self.height, "pixel ({x}, {y}) outside framebuffer");
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.framebuffer[i],
            self.framebuffer[i + 1],
            self.framebuffer[i + 2],
            self.framebuffer[i + 3],
        ]
    }

    /// Raw RGBA8 framebuffer, top row first.
    pub fn framebuffer(&self) -> &[u8] {
        &self.framebuffer
    }
}

impl GraphicsContext for SoftContext {
    type Program = SoftProgram;
    type Texture = SoftTexture;

    fn create_program(&mut self, program: &LinkedProgram) -> Result<SoftProgram, RenderError> {
        self.display.state.lock().live_programs += 1;
        Ok(SoftProgram {
            display: self.display.clone(),
            attributes: program.attributes(),
        })
    }

    fn create_texture(&mut self, sampler: &SamplerParams) -> Result<SoftTexture, RenderError> {
        Ok(SoftTexture {
            id: self.display.alloc_texture(),
            display: self.display.clone(),
            sampler: *sampler,
            texels: Image::default(),
        })
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        if (width, height) != (self.width, self.height) {
            self.width = width;
            self.height = height;
            self.framebuffer = vec![0; width as usize * height as usize * 4];
        }
    }

    fn viewport(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn begin_frame(&mut self, clear: [f32; 4]) -> Result<(), RenderError> {
        let rgba = color_to_rgba8(clear);
        for px in self.framebuffer.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
        self.in_frame = true;
        self.stats.frames += 1;
        Ok(())
    }

    fn upload_luminance(&mut self, texture: &mut SoftTexture, image: &Image<u8>) -> Result<(), RenderError> {
        texture.texels.resize(image.width(), image.height());
        for y in 0..image.height() {
            texture.texels.row_mut(y).copy_from_slice(image.row(y));
        }
        self.stats.uploads += 1;
        Ok(())
    }

    fn draw_quad(&mut self, program: &SoftProgram, texture: &SoftTexture, quad: &Quad) -> Result<(), RenderError> {
        if !self.in_frame {
            return Err(RenderError::NotInFrame("draw_quad"));
        }
        let attrs = program.attributes;
        self.enabled_attributes.extend([attrs.position, attrs.tex_coord]);

        let (w, h) = (self.width as f32, self.height as f32);
        let verts: [Vertex; 4] = std::array::from_fn(|i| {
            let [nx, ny] = quad.positions[i];
            let [u, v] = quad.tex_coords[i];
            Vertex {
                x: (nx + 1.0) * 0.5 * w,
                y: (1.0 - ny) * 0.5 * h,
                u,
                v,
            }
        });
        let target = Target {
            pixels: &mut self.framebuffer,
            width: self.width as usize,
            height: self.height as usize,
        };
        fill_triangle(target, [verts[0], verts[1], verts[2]], texture);
        let target = Target {
            pixels: &mut self.framebuffer,
            width: self.width as usize,
            height: self.height as usize,
        };
        fill_triangle(target, [verts[2], verts[1], verts[3]], texture);

        self.enabled_attributes.clear();
        self.stats.draws += 1;
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), RenderError> {
        if !self.in_frame {
            return Err(RenderError::NotInFrame("end_frame"));
        }
        self.in_frame = false;
        Ok(())
    }

    fn read_pixels(&mut self) -> Result<RgbaImage, RenderError> {
        RgbaImage::from_raw(self.width, self.height, self.framebuffer.clone())
            .ok_or_else(|| RenderError::Readback("framebuffer size mismatch".into()))
    }
}

// ============================================================
// Rasterization
// ============================================================

/// Vertex in window space (y down), with texture coordinates.
#[derive(Debug, Clone, Copy)]
struct Vertex {
    x: f32,
    y: f32,
    u: f32,
    v: f32,
}

struct Target<'a> {
    pixels: &'a mut [u8],
    width: usize,
    height: usize,
}

/// Twice the signed area of (a, b, p).
#[inline]
fn edge(a: Vertex, b: Vertex, px: f32, py: f32) -> f32 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

fn fill_triangle(target: Target<'_>, [v0, v1, v2]: [Vertex; 3], texture: &SoftTexture) {
    let area = edge(v0, v1, v2.x, v2.y);
    if area.abs() < f32::EPSILON {
        return;
    }

    // Constant texcoord gradients across the triangle, in texels per pixel.
    let (tw, th) = (texture.texels.width() as f32, texture.texels.height() as f32);
    let (ex1, ey1) = (v1.x - v0.x, v1.y - v0.y);
    let (ex2, ey2) = (v2.x - v0.x, v2.y - v0.y);
    let dudx = ((v1.u - v0.u) * ey2 - (v2.u - v0.u) * ey1) / area * tw;
    let dvdx = ((v1.v - v0.v) * ey2 - (v2.v - v0.v) * ey1) / area * th;
    let dudy = ((v2.u - v0.u) * ex1 - (v1.u - v0.u) * ex2) / area * tw;
    let dvdy = ((v2.v - v0.v) * ex1 - (v1.v - v0.v) * ex2) / area * th;
    let rho = dudx.hypot(dvdx).max(dudy.hypot(dvdy));
    let filter = if rho > 1.0 {
        texture.sampler.min_filter
    } else {
        texture.sampler.mag_filter
    };

    let min_x = v0.x.min(v1.x).min(v2.x).floor().max(0.0) as usize;
    let min_y = v0.y.min(v1.y).min(v2.y).floor().max(0.0) as usize;
    let max_x = (v0.x.max(v1.x).max(v2.x).ceil().max(0.0) as usize).min(target.width);
    let max_y = (v0.y.max(v1.y).max(v2.y).ceil().max(0.0) as usize).min(target.height);

    const INSIDE_EPS: f32 = -1e-6;
    for py in min_y..max_y {
        let cy = py as f32 + 0.5;
        for px in min_x..max_x {
            let cx = px as f32 + 0.5;
            let b0 = edge(v1, v2, cx, cy) / area;
            let b1 = edge(v2, v0, cx, cy) / area;
            let b2 = 1.0 - b0 - b1;
            if b0 < INSIDE_EPS || b1 < INSIDE_EPS || b2 < INSIDE_EPS {
                continue;
            }
            let u = b0 * v0.u + b1 * v1.u + b2 * v2.u;
            let v = b0 * v0.v + b1 * v1.v + b2 * v2.v;
            let l = sample(&texture.texels, &texture.sampler, filter, u, v);
            let i = (py * target.width + px) * 4;
            target.pixels[i..i + 4].copy_from_slice(&[l, l, l, 255]);
        }
    }
}

#[inline]
fn wrap(i: i64, n: usize, mode: WrapMode) -> usize {
    match mode {
        WrapMode::ClampToEdge => i.clamp(0, n as i64 - 1) as usize,
        WrapMode::Repeat => i.rem_euclid(n as i64) as usize,
    }
}

/// Sample the luminance texture at normalized (u, v). An empty texture
/// samples as black.
fn sample(texels: &Image<u8>, sampler: &SamplerParams, filter: FilterMode, u: f32, v: f32) -> u8 {
    let (tw, th) = (texels.width(), texels.height());
    if tw == 0 || th == 0 {
        return 0;
    }
    let x = u * tw as f32;
    let y = v * th as f32;
    match filter {
        FilterMode::Nearest => {
            let ix = wrap(x.floor() as i64, tw, sampler.wrap_s);
            let iy = wrap(y.floor() as i64, th, sampler.wrap_t);
            texels.get(ix, iy)
        }
        FilterMode::Linear => {
            let (x, y) = (x - 0.5, y - 0.5);
            let (x0, y0) = (x.floor(), y.floor());
            let (fx, fy) = (x - x0, y - y0);
            let (x0, y0) = (x0 as i64, y0 as i64);
            let (ix0, ix1) = (wrap(x0, tw, sampler.wrap_s), wrap(x0 + 1, tw, sampler.wrap_s));
            let (iy0, iy1) = (wrap(y0, th, sampler.wrap_t), wrap(y0 + 1, th, sampler.wrap_t));
            let t = |x, y| texels.get(x, y) as f32;
            let top = t(ix0, iy0) * (1.0 - fx) + t(ix1, iy0) * fx;
            let bottom = t(ix0, iy1) * (1.0 - fx) + t(ix1, iy1) * fx;
            (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8
        }
    }
}
