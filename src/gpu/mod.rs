// gpu/mod.rs — Display layer: edge map → texture → full-screen quad.
//
// The renderer is written once against the `GraphicsContext` trait and runs
// on two backends:
//
//   WgpuContext — a real GPU device via wgpu, rendering into an offscreen
//                 RGBA target that can be read back (window display and
//                 snapshots go through the readback).
//   SoftContext — a CPU rasterizer with the same sampling semantics, used
//                 by the headless tests and as a fallback when no adapter
//                 is available.
//
// Everything a context hands out (programs, textures) is an owned handle
// that releases the underlying object when dropped. Surface loss is then
// just "drop the handles, drop the context", with nothing to leak.

pub mod device;
pub mod renderer;
pub mod shader;
pub mod soft;
pub mod wgpu_context;

use std::fmt;

use thiserror::Error;

use crate::image::Image;
use device::DeviceError;
use shader::{LinkedProgram, ShaderError};

pub use renderer::{DrawOutcome, GpuProgramState, RendererState, TextureRenderer};

/// Name of a texture object, unique among live textures of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tex#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapMode {
    ClampToEdge,
    Repeat,
}

/// Texture sampling state, fixed at texture creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerParams {
    /// Filter when a screen pixel covers more than one texel.
    pub min_filter: FilterMode,
    /// Filter when a texel covers more than one screen pixel.
    pub mag_filter: FilterMode,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
}

impl SamplerParams {
    /// Edge map sampling: nearest when shrinking (keeps one-pixel edges
    /// crisp), linear when enlarging, clamped on both axes.
    pub const EDGE_MAP: SamplerParams = SamplerParams {
        min_filter: FilterMode::Nearest,
        mag_filter: FilterMode::Linear,
        wrap_s: WrapMode::ClampToEdge,
        wrap_t: WrapMode::ClampToEdge,
    };
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self::EDGE_MAP
    }
}

/// Four triangle-strip vertices: NDC positions and texture coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub positions: [[f32; 2]; 4],
    pub tex_coords: [[f32; 2]; 4],
}

impl Quad {
    /// Covers the whole viewport. Texture rows run top-down while NDC y
    /// runs bottom-up, so v is flipped: the bottom corners sample v = 1.
    pub const FULL_SCREEN: Quad = Quad {
        positions: [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]],
        tex_coords: [[0.0, 1.0], [1.0, 1.0], [0.0, 0.0], [1.0, 0.0]],
    };
}

impl Default for Quad {
    fn default() -> Self {
        Self::FULL_SCREEN
    }
}

/// Errors from the display layer.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Shader(#[from] ShaderError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("backend rejected pipeline: {0}")]
    Pipeline(String),
    #[error("{0} called outside begin_frame/end_frame")]
    NotInFrame(&'static str),
    #[error("texture upload failed: {0}")]
    Upload(String),
    #[error("pixel readback failed: {0}")]
    Readback(String),
}

/// A texture handle; the texture is released when the handle is dropped.
pub trait TextureHandle {
    fn id(&self) -> TextureId;
}

/// The drawing operations the texture renderer needs from a GPU context.
///
/// One frame is `begin_frame` → any number of uploads and draws →
/// `end_frame`. Vertex attributes are bound for the duration of a single
/// `draw_quad` call and unbound when it returns.
pub trait GraphicsContext {
    type Program;
    type Texture: TextureHandle;

    /// Create a backend program object from a linked program.
    fn create_program(&mut self, program: &LinkedProgram) -> Result<Self::Program, RenderError>;

    /// Create an empty (0×0) texture with the given sampling state.
    fn create_texture(&mut self, sampler: &SamplerParams) -> Result<Self::Texture, RenderError>;

    /// Resize the drawable to `width × height` and draw into all of it.
    fn set_viewport(&mut self, width: u32, height: u32);

    fn viewport(&self) -> (u32, u32);

    /// Start a frame by clearing the drawable to `clear` (RGBA in [0, 1]).
    fn begin_frame(&mut self, clear: [f32; 4]) -> Result<(), RenderError>;

    /// Replace the texture's contents (and size) with a luminance image.
    fn upload_luminance(&mut self, texture: &mut Self::Texture, image: &Image<u8>) -> Result<(), RenderError>;

    /// Draw `quad` as a 4-vertex triangle strip sampling `texture`.
    fn draw_quad(&mut self, program: &Self::Program, texture: &Self::Texture, quad: &Quad) -> Result<(), RenderError>;

    /// Finish and submit the frame.
    fn end_frame(&mut self) -> Result<(), RenderError>;

    /// Copy the drawable back to the CPU as RGBA8, top row first.
    fn read_pixels(&mut self) -> Result<image::RgbaImage, RenderError>;
}
