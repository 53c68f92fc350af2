// gpu/renderer.rs — Surface lifecycle and per-tick drawing.
//
// State machine:
//
//   Uninitialized ──on_surface_created ok──▶ Ready
//        ▲                                     │
//        └──── on_surface_destroyed ───────────┘
//
// `on_surface_created` while Ready counts as a surface loss followed by a
// new surface: the old program and texture are released before anything
// is created on the new context.
//
// Each draw tick clears, then (Ready + a published frame) re-uploads the
// newest edge map in full and draws one full-screen quad. Nothing here
// blocks on the producer: `FrameSlot::latest` is an Arc clone under a
// short lock.

use std::borrow::Cow;
use std::sync::Arc;

use tracing::{debug, error, info};

use super::shader::{build_program, AttributeLocations, FRAGMENT_SHADER, VERTEX_SHADER};
use super::{GraphicsContext, Quad, RenderError, SamplerParams, TextureHandle, TextureId};
use crate::config::RenderConfig;
use crate::slot::FrameSlot;
use crate::LOG_TAG;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    Uninitialized,
    Ready,
}

/// What a draw tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    /// No surface: nothing was touched.
    NoSurface,
    /// Cleared only (not Ready, or nothing published yet).
    Cleared,
    /// Drew the frame with this sequence number.
    Drew(u64),
}

/// GPU objects owned while Ready. Dropping it releases them.
pub struct GpuProgramState<C: GraphicsContext> {
    program: C::Program,
    texture: C::Texture,
    attributes: AttributeLocations,
}

impl<C: GraphicsContext> GpuProgramState<C> {
    fn create(ctx: &mut C, vertex_src: &str, fragment_src: &str) -> Result<Self, RenderError> {
        let linked = build_program(vertex_src, fragment_src)?;
        let program = ctx.create_program(&linked)?;
        let texture = ctx.create_texture(&SamplerParams::EDGE_MAP)?;
        Ok(GpuProgramState {
            program,
            texture,
            attributes: linked.attributes(),
        })
    }

    pub fn attributes(&self) -> AttributeLocations {
        self.attributes
    }

    pub fn texture_id(&self) -> TextureId {
        self.texture.id()
    }
}

/// Draws the newest published edge map on every display tick.
pub struct TextureRenderer<C: GraphicsContext> {
    slot: Arc<FrameSlot>,
    config: RenderConfig,
    vertex_src: Cow<'static, str>,
    fragment_src: Cow<'static, str>,
    quad: Quad,
    // Declared before `context`: handles must drop before their context.
    state: Option<GpuProgramState<C>>,
    context: Option<C>,
}

impl<C: GraphicsContext> TextureRenderer<C> {
    pub fn new(slot: Arc<FrameSlot>, config: RenderConfig) -> Self {
        Self::with_shaders(slot, config, VERTEX_SHADER, FRAGMENT_SHADER)
    }

    /// A renderer built from custom shader sources.
    pub fn with_shaders(
        slot: Arc<FrameSlot>,
        config: RenderConfig,
        vertex_src: impl Into<Cow<'static, str>>,
        fragment_src: impl Into<Cow<'static, str>>,
    ) -> Self {
        TextureRenderer {
            slot,
            config,
            vertex_src: vertex_src.into(),
            fragment_src: fragment_src.into(),
            quad: Quad::FULL_SCREEN,
            state: None,
            context: None,
        }
    }

    pub fn state(&self) -> RendererState {
        if self.state.is_some() {
            RendererState::Ready
        } else {
            RendererState::Uninitialized
        }
    }

    /// The texture id while Ready.
    pub fn texture_id(&self) -> Option<TextureId> {
        self.state.as_ref().map(|s| s.texture_id())
    }

    pub fn program_state(&self) -> Option<&GpuProgramState<C>> {
        self.state.as_ref()
    }

    pub fn context(&self) -> Option<&C> {
        self.context.as_ref()
    }

    pub fn context_mut(&mut self) -> Option<&mut C> {
        self.context.as_mut()
    }

    pub fn slot(&self) -> &Arc<FrameSlot> {
        &self.slot
    }

    /// A drawing surface (and its context) became available.
    ///
    /// Builds the program and texture. On failure the error is logged, the
    /// renderer stays Uninitialized and the context is kept so draw ticks
    /// still clear the display.
    pub fn on_surface_created(&mut self, context: C) -> Result<(), RenderError> {
        if self.state.is_some() {
            debug!(target: LOG_TAG, "surface recreated while ready; releasing previous objects");
        }
        self.release();
        let ctx = self.context.insert(context);

        match GpuProgramState::create(ctx, &self.vertex_src, &self.fragment_src) {
            Ok(state) => {
                info!(
                    target: LOG_TAG,
                    texture = %state.texture_id(),
                    position = state.attributes.position,
                    tex_coord = state.attributes.tex_coord,
                    "renderer ready"
                );
                self.state = Some(state);
                Ok(())
            }
            Err(e) => {
                error!(target: LOG_TAG, "could not create program: {e}");
                Err(e)
            }
        }
    }

    /// The drawable was resized. Ignored unless Ready.
    pub fn on_surface_changed(&mut self, width: u32, height: u32) {
        if self.state.is_none() {
            debug!(target: LOG_TAG, width, height, "surface changed before ready; ignored");
            return;
        }
        if let Some(ctx) = self.context.as_mut() {
            ctx.set_viewport(width, height);
            debug!(target: LOG_TAG, width, height, "viewport updated");
        }
    }

    /// The surface is gone: release every GPU object and the context.
    pub fn on_surface_destroyed(&mut self) {
        if self.context.is_some() {
            info!(target: LOG_TAG, "surface destroyed");
        }
        self.release();
    }

    fn release(&mut self) {
        self.state = None;
        self.context = None;
    }

    /// One display tick.
    pub fn on_draw_frame(&mut self) -> Result<DrawOutcome, RenderError> {
        let Some(ctx) = self.context.as_mut() else {
            return Ok(DrawOutcome::NoSurface);
        };
        ctx.begin_frame(self.config.clear_color)?;

        let drawn = match (self.state.as_mut(), self.slot.latest()) {
            (Some(state), Some(frame)) => ctx
                .upload_luminance(&mut state.texture, frame.image())
                .and_then(|()| ctx.draw_quad(&state.program, &state.texture, &self.quad))
                .map(|()| DrawOutcome::Drew(frame.sequence())),
            _ => Ok(DrawOutcome::Cleared),
        };
        // Close the frame even when the draw failed.
        let ended = ctx.end_frame();
        let outcome = drawn?;
        ended?;
        Ok(outcome)
    }
}
