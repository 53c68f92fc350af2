// gpu/wgpu_context.rs — GraphicsContext on a real GPU via wgpu.
//
// RENDER TARGET
// ──────────────
// Frames render into an offscreen `Rgba8Unorm` texture the size of the
// viewport. A non-sRGB format keeps luminance values unchanged between the
// edge map and the readback, so a snapshot or window shows exactly the
// bytes the fragment stage wrote.
//
// FRAME RECORDING
// ────────────────
//   begin_frame  — new CommandEncoder + a render pass that only clears.
//   upload       — queue.write_texture (staged; lands before the frame's
//                  commands at submit time).
//   draw_quad    — a second render pass (LoadOp::Load) binding the program,
//                  the texture's bind group and two vertex buffers, one per
//                  attribute, then a 4-vertex triangle strip.
//   end_frame    — submit.
//
// The edge texture is `R8Unorm`: one channel, sampled as `.r` in [0, 1]
// by the fragment stage. It is (re)allocated whenever the uploaded image
// changes size; the bind group is rebuilt with it.
//
// wgpu reports validation failures through error scopes rather than return
// values. Pipeline creation runs inside a validation scope so a rejected
// program becomes a `RenderError` instead of an uncaptured-error panic.

use std::sync::atomic::{AtomicU32, Ordering};

use image::RgbaImage;
use tracing::debug;
use wgpu::util::DeviceExt;

use super::device::GpuDevice;
use super::shader::{AttributeLocations, LinkedProgram};
use super::{
    FilterMode, GraphicsContext, Quad, RenderError, SamplerParams, TextureHandle, TextureId,
    WrapMode,
};
use crate::image::Image;
use crate::LOG_TAG;

/// Offscreen color format.
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// wgpu requires that the number of bytes per row in a texture→buffer copy
/// is a multiple of this value.
const COPY_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

/// Texture names are process-wide so a recreated context never hands out
/// the name of a texture from the context it replaced.
static NEXT_TEXTURE_ID: AtomicU32 = AtomicU32::new(1);

// ============================================================
// Handles
// ============================================================

pub struct WgpuProgram {
    pipeline: wgpu::RenderPipeline,
    attributes: AttributeLocations,
}

impl WgpuProgram {
    pub fn attributes(&self) -> AttributeLocations {
        self.attributes
    }
}

/// GPU storage of the edge texture at its current size.
struct TextureStorage {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

pub struct WgpuTexture {
    id: TextureId,
    sampler: wgpu::Sampler,
    storage: Option<TextureStorage>,
}

impl WgpuTexture {
    /// Current texture size; (0, 0) before the first upload.
    pub fn size(&self) -> (u32, u32) {
        self.storage.as_ref().map_or((0, 0), |s| (s.width, s.height))
    }
}

impl TextureHandle for WgpuTexture {
    fn id(&self) -> TextureId {
        self.id
    }
}

// ============================================================
// Context
// ============================================================

/// Offscreen render target and its view.
struct Target {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl Target {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        // Zero-sized textures are invalid; a collapsed window still gets 1×1.
        let (width, height) = (width.max(1), height.max(1));
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("edgecam target"),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            // RENDER_ATTACHMENT — draw into it.
            // COPY_SRC          — read it back.
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Target { texture, view, width, height }
    }
}

pub struct WgpuContext {
    // Declared before `gpu` so GPU objects drop before the device.
    bind_group_layout: wgpu::BindGroupLayout,
    target: Target,
    frame: Option<wgpu::CommandEncoder>,
    gpu: GpuDevice,
}

impl WgpuContext {
    /// Context on an existing device, rendering `width × height`.
    pub fn new(gpu: GpuDevice, width: u32, height: u32) -> Self {
        let bind_group_layout = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("edge texture BGL"),
            entries: &[
                // Binding 0 — edge texture (texture_2d<f32>)
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                // Binding 1 — sampler
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let target = Target::new(&gpu.device, width, height);
        WgpuContext {
            bind_group_layout,
            target,
            frame: None,
            gpu,
        }
    }

    /// Create a device and a context on it.
    pub fn headless(width: u32, height: u32) -> Result<Self, RenderError> {
        let gpu = GpuDevice::new()?;
        Ok(Self::new(gpu, width, height))
    }

    pub fn gpu(&self) -> &GpuDevice {
        &self.gpu
    }

    fn create_sampler(&self, params: &SamplerParams) -> wgpu::Sampler {
        self.gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("edge sampler"),
            address_mode_u: address_mode(params.wrap_s),
            address_mode_v: address_mode(params.wrap_t),
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: filter_mode(params.mag_filter),
            min_filter: filter_mode(params.min_filter),
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        })
    }

    fn create_storage(&self, sampler: &wgpu::Sampler, width: u32, height: u32) -> TextureStorage {
        let texture = self.gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("edge texture"),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            // R8Unorm: single-channel u8 stored as float [0,1] in shaders.
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("edge texture bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });
        TextureStorage { texture, bind_group, width, height }
    }
}

fn filter_mode(mode: FilterMode) -> wgpu::FilterMode {
    match mode {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

fn address_mode(mode: WrapMode) -> wgpu::AddressMode {
    match mode {
        WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
    }
}

impl GraphicsContext for WgpuContext {
    type Program = WgpuProgram;
    type Texture = WgpuTexture;

    fn create_program(&mut self, program: &LinkedProgram) -> Result<WgpuProgram, RenderError> {
        let device = &self.gpu.device;
        let attributes = program.attributes();

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vs = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("quad vertex"),
            source: wgpu::ShaderSource::Wgsl(program.vertex().source().into()),
        });
        let fs = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("edge fragment"),
            source: wgpu::ShaderSource::Wgsl(program.fragment().source().into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("edge quad pipeline layout"),
            bind_group_layouts: &[&self.bind_group_layout],
            push_constant_ranges: &[],
        });

        // One buffer per attribute, tightly packed vec2<f32>.
        let position_attr = [wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x2,
            offset: 0,
            shader_location: attributes.position,
        }];
        let tex_coord_attr = [wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x2,
            offset: 0,
            shader_location: attributes.tex_coord,
        }];
        let stride = std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress;
        let buffers = [
            wgpu::VertexBufferLayout {
                array_stride: stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &position_attr,
            },
            wgpu::VertexBufferLayout {
                array_stride: stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &tex_coord_attr,
            },
        ];

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("edge quad"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vs,
                entry_point: program.vertex().entry_point(),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &buffers,
            },
            fragment: Some(wgpu::FragmentState {
                module: &fs,
                entry_point: program.fragment().entry_point(),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::Pipeline(err.to_string()));
        }
        Ok(WgpuProgram { pipeline, attributes })
    }

    fn create_texture(&mut self, params: &SamplerParams) -> Result<WgpuTexture, RenderError> {
        let id = TextureId(NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed));
        Ok(WgpuTexture {
            id,
            sampler: self.create_sampler(params),
            storage: None,
        })
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        if (width.max(1), height.max(1)) != (self.target.width, self.target.height) {
            self.target = Target::new(&self.gpu.device, width, height);
            debug!(target: LOG_TAG, width, height, "offscreen target resized");
        }
    }

    fn viewport(&self) -> (u32, u32) {
        (self.target.width, self.target.height)
    }

    fn begin_frame(&mut self, clear: [f32; 4]) -> Result<(), RenderError> {
        let mut encoder = self.gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("edgecam frame"),
        });
        let [r, g, b, a] = clear.map(f64::from);
        // The pass only clears; it ends when dropped.
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("clear"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        // A frame left open by a failed tick is discarded.
        self.frame = Some(encoder);
        Ok(())
    }

    fn upload_luminance(&mut self, texture: &mut WgpuTexture, image: &Image<u8>) -> Result<(), RenderError> {
        let (width, height) = (image.width() as u32, image.height() as u32);
        if width == 0 || height == 0 {
            return Err(RenderError::Upload(format!("empty image {width}×{height}")));
        }
        let max = self.gpu.max_texture_dimension();
        if width > max || height > max {
            return Err(RenderError::Upload(format!(
                "{width}×{height} exceeds the device limit of {max}"
            )));
        }
        if texture.size() != (width, height) {
            texture.storage = Some(self.create_storage(&texture.sampler, width, height));
        }
        let Some(storage) = texture.storage.as_ref() else {
            return Err(RenderError::Upload("texture storage missing".into()));
        };

        // write_texture has no row alignment requirement, so the image's
        // own stride is passed through and padding bytes are skipped.
        self.gpu.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &storage.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.as_slice(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(image.stride() as u32),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );
        Ok(())
    }

    fn draw_quad(&mut self, program: &WgpuProgram, texture: &WgpuTexture, quad: &Quad) -> Result<(), RenderError> {
        let encoder = self.frame.as_mut().ok_or(RenderError::NotInFrame("draw_quad"))?;
        // Nothing uploaded yet: sampling an incomplete texture yields black,
        // which is what the clear already left.
        let Some(storage) = texture.storage.as_ref() else {
            return Ok(());
        };

        let positions = self.gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad positions"),
            contents: bytemuck::cast_slice(&quad.positions),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let tex_coords = self.gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad tex coords"),
            contents: bytemuck::cast_slice(&quad.tex_coords),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("edge quad"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&program.pipeline);
        pass.set_bind_group(0, &storage.bind_group, &[]);
        pass.set_vertex_buffer(0, positions.slice(..));
        pass.set_vertex_buffer(1, tex_coords.slice(..));
        pass.draw(0..4, 0..1);
        // Attribute bindings end with the pass.
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), RenderError> {
        let encoder = self.frame.take().ok_or(RenderError::NotInFrame("end_frame"))?;
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    /// Expensive and synchronous: stalls until the GPU has finished the
    /// copy. Use for snapshots, tests and window mirroring only.
    fn read_pixels(&mut self) -> Result<RgbaImage, RenderError> {
        let (width, height) = (self.target.width, self.target.height);
        let row_bytes = width * 4;
        let aligned_bytes_per_row = align_to(row_bytes, COPY_ALIGNMENT);

        let readback_buf = self.gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("edgecam readback"),
            size: (aligned_bytes_per_row * height) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self.gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("edgecam readback"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &readback_buf,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(aligned_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );
        self.gpu.queue.submit(std::iter::once(encoder.finish()));

        // Map the buffer, then poll until the copy is done and the map
        // callback fires.
        let buf_slice = readback_buf.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        buf_slice.map_async(wgpu::MapMode::Read, move |result| {
            // The receiver outlives the poll below.
            let _ = sender.send(result);
        });
        self.gpu.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| RenderError::Readback("map callback never fired".into()))?
            .map_err(|e| RenderError::Readback(e.to_string()))?;

        // Strip the alignment padding from each row.
        let mapped = buf_slice.get_mapped_range();
        let mut out = Vec::with_capacity((row_bytes * height) as usize);
        for row in mapped.chunks_exact(aligned_bytes_per_row as usize) {
            out.extend_from_slice(&row[..row_bytes as usize]);
        }
        drop(mapped);
        readback_buf.unmap();

        RgbaImage::from_raw(width, height, out)
            .ok_or_else(|| RenderError::Readback("short readback buffer".into()))
    }
}

/// Round `value` up to the next multiple of `alignment`.
///
///   align_to(100, 256) = 256
///   align_to(256, 256) = 256
///   align_to(257, 256) = 512
#[inline]
pub(crate) fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}
