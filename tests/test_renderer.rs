// tests/test_renderer.rs — Integration tests for the display side:
// FrameSlot → TextureRenderer → framebuffer.
//
// Everything here runs on the software context, so no GPU is needed. The
// wgpu backend gets the same treatment in the ignored test at the bottom.

use std::sync::Arc;

use edgecam::config::RenderConfig;
use edgecam::gpu::shader::{FRAGMENT_SHADER, VERTEX_SHADER};
use edgecam::gpu::soft::{SoftContext, SoftDisplay};
use edgecam::gpu::{DrawOutcome, GraphicsContext, RenderError, RendererState, TextureRenderer};
use edgecam::image::Image;
use edgecam::slot::FrameSlot;

fn setup(width: u32, height: u32) -> (TextureRenderer<SoftContext>, Arc<FrameSlot>, SoftDisplay) {
    let slot = Arc::new(FrameSlot::new());
    let mut renderer = TextureRenderer::new(Arc::clone(&slot), RenderConfig::default());
    let display = SoftDisplay::new();
    renderer.on_surface_created(display.create_context(width, height)).unwrap();
    renderer.on_surface_changed(width, height);
    (renderer, slot, display)
}

/// Luminance of every framebuffer pixel, row-major.
fn luminance(renderer: &mut TextureRenderer<SoftContext>) -> Vec<u8> {
    let pixels = renderer.context_mut().unwrap().read_pixels().unwrap();
    pixels.pixels().map(|p| p.0[0]).collect()
}

// ===== Drawing =====

#[test]
fn published_frame_is_displayed_pixel_for_pixel() {
    let (mut renderer, slot, _display) = setup(4, 3);
    let edges = Image::from_vec(4, 3, vec![0, 255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255]);
    slot.publish(edges.clone());

    assert_eq!(renderer.on_draw_frame().unwrap(), DrawOutcome::Drew(1));
    assert_eq!(luminance(&mut renderer), edges.as_slice());

    // Output is opaque gray: R = G = B, alpha 255.
    let ctx = renderer.context().unwrap();
    assert_eq!(ctx.pixel(1, 0), [255, 255, 255, 255]);
    assert_eq!(ctx.pixel(0, 0), [0, 0, 0, 255]);
}

#[test]
fn drawing_twice_without_publish_is_idempotent() {
    let (mut renderer, slot, _display) = setup(6, 6);
    slot.publish(Image::from_vec(3, 3, vec![0, 40, 80, 120, 160, 200, 240, 255, 10]));

    renderer.on_draw_frame().unwrap();
    let first = luminance(&mut renderer);
    renderer.on_draw_frame().unwrap();
    assert_eq!(luminance(&mut renderer), first);
}

#[test]
fn only_the_newest_publish_is_shown() {
    let (mut renderer, slot, _display) = setup(8, 8);
    slot.publish(Image::filled(8, 8, 50));
    slot.publish(Image::filled(8, 8, 200));

    assert_eq!(renderer.on_draw_frame().unwrap(), DrawOutcome::Drew(2));
    assert!(luminance(&mut renderer).iter().all(|&l| l == 200));
}

#[test]
fn frame_is_stretched_to_the_viewport() {
    // A 2×1 frame (black | white) on an 8×2 surface: left half black,
    // right half white, with a linear ramp only around the seam.
    let (mut renderer, slot, _display) = setup(8, 2);
    slot.publish(Image::from_vec(2, 1, vec![0, 255]));
    renderer.on_draw_frame().unwrap();

    let lum = luminance(&mut renderer);
    for row in lum.chunks(8) {
        assert_eq!(row[0], 0);
        assert_eq!(row[7], 255);
        assert!(row.windows(2).all(|w| w[0] <= w[1]), "row not monotonic: {row:?}");
    }
}

#[test]
fn viewport_change_applies_to_next_draw() {
    let (mut renderer, slot, _display) = setup(4, 4);
    slot.publish(Image::filled(2, 2, 90));
    renderer.on_surface_changed(10, 5);
    renderer.on_draw_frame().unwrap();

    let pixels = renderer.context_mut().unwrap().read_pixels().unwrap();
    assert_eq!(pixels.dimensions(), (10, 5));
    assert!(pixels.pixels().all(|p| p.0 == [90, 90, 90, 255]));
}

#[test]
fn attributes_are_disabled_after_each_draw() {
    let (mut renderer, slot, _display) = setup(4, 4);
    slot.publish(Image::filled(4, 4, 1));
    renderer.on_draw_frame().unwrap();

    let ctx = renderer.context().unwrap();
    assert!(ctx.enabled_attributes().is_empty());
    assert_eq!(ctx.stats().draws, 1);
}

#[test]
fn every_tick_reuploads_the_frame() {
    let (mut renderer, slot, _display) = setup(4, 4);
    slot.publish(Image::filled(4, 4, 7));
    for _ in 0..3 {
        renderer.on_draw_frame().unwrap();
    }
    let stats = renderer.context().unwrap().stats();
    assert_eq!((stats.frames, stats.uploads, stats.draws), (3, 3, 3));
}

// ===== Boundaries =====

#[test]
fn draw_before_surface_and_before_publish_is_harmless() {
    let slot = Arc::new(FrameSlot::new());
    let mut renderer = TextureRenderer::<SoftContext>::new(Arc::clone(&slot), RenderConfig::default());
    assert_eq!(renderer.on_draw_frame().unwrap(), DrawOutcome::NoSurface);

    renderer.on_surface_created(SoftDisplay::new().create_context(4, 4)).unwrap();
    renderer.on_surface_changed(4, 4);
    assert_eq!(renderer.on_draw_frame().unwrap(), DrawOutcome::Cleared);

    let ctx = renderer.context().unwrap();
    assert_eq!(ctx.stats().uploads, 0, "nothing to sample before the first publish");
    assert!(luminance(&mut renderer).iter().all(|&l| l == 0));
}

#[test]
fn clear_color_is_configurable() {
    let slot = Arc::new(FrameSlot::new());
    let config = RenderConfig { clear_color: [1.0, 0.0, 0.0, 1.0] };
    let mut renderer = TextureRenderer::<SoftContext>::new(slot, config);
    renderer.on_surface_created(SoftDisplay::new().create_context(2, 2)).unwrap();
    renderer.on_draw_frame().unwrap();
    assert_eq!(renderer.context().unwrap().pixel(1, 1), [255, 0, 0, 255]);
}

#[test]
fn broken_shader_stays_uninitialized_but_still_clears() {
    let slot = Arc::new(FrameSlot::new());
    let broken_fragment = "@fragment fn fs_main() -> @location(0) vec4<f32> { return undefined_value; }";
    let mut renderer = TextureRenderer::<SoftContext>::with_shaders(
        Arc::clone(&slot),
        RenderConfig::default(),
        VERTEX_SHADER,
        broken_fragment,
    );
    let display = SoftDisplay::new();
    let err = renderer.on_surface_created(display.create_context(4, 4)).unwrap_err();
    assert!(matches!(err, RenderError::Shader(_)), "{err}");
    assert_eq!(renderer.state(), RendererState::Uninitialized);
    assert!(display.live_textures().is_empty());
    assert_eq!(display.live_programs(), 0);

    slot.publish(Image::filled(4, 4, 255));
    assert_eq!(renderer.on_draw_frame().unwrap(), DrawOutcome::Cleared);
    assert!(luminance(&mut renderer).iter().all(|&l| l == 0));
}

#[test]
fn mismatched_stage_interfaces_fail_to_link() {
    let fragment = "@group(0) @binding(0) var t: texture_2d<f32>;\n\
                    @group(0) @binding(1) var s: sampler;\n\
                    @fragment fn fs_main(@location(3) uv: vec2<f32>) -> @location(0) vec4<f32> {\n\
                        return textureSample(t, s, uv);\n\
                    }";
    let mut renderer = TextureRenderer::<SoftContext>::with_shaders(
        Arc::new(FrameSlot::new()),
        RenderConfig::default(),
        VERTEX_SHADER,
        fragment,
    );
    let err = renderer.on_surface_created(SoftDisplay::new().create_context(2, 2)).unwrap_err();
    assert!(matches!(err, RenderError::Shader(_)), "{err}");
    assert_eq!(renderer.state(), RendererState::Uninitialized);
}

// ===== Surface lifecycle =====

#[test]
fn surface_loss_recovers_with_a_fresh_texture() {
    let (mut renderer, slot, display) = setup(4, 4);
    slot.publish(Image::filled(4, 4, 128));
    renderer.on_draw_frame().unwrap();
    let old = renderer.texture_id().unwrap();

    // Context lost: the platform hands over a new surface without an
    // explicit destroy.
    renderer.on_surface_created(display.create_context(4, 4)).unwrap();
    renderer.on_surface_changed(4, 4);
    assert_eq!(renderer.state(), RendererState::Ready);

    let new = renderer.texture_id().unwrap();
    assert_ne!(new, old);
    assert_eq!(display.live_textures(), vec![new], "old texture leaked");
    assert_eq!(display.live_programs(), 1, "old program leaked");

    // The newest frame is drawn on the new surface without republishing.
    assert_eq!(renderer.on_draw_frame().unwrap(), DrawOutcome::Drew(1));
    assert!(luminance(&mut renderer).iter().all(|&l| l == 128));
}

#[test]
fn destroy_then_create_cycles_do_not_leak() {
    let (mut renderer, _slot, display) = setup(2, 2);
    let mut seen = vec![renderer.texture_id().unwrap()];
    for _ in 0..5 {
        renderer.on_surface_destroyed();
        assert_eq!(renderer.state(), RendererState::Uninitialized);
        assert!(display.live_textures().is_empty());
        assert_eq!(renderer.on_draw_frame().unwrap(), DrawOutcome::NoSurface);

        renderer.on_surface_created(display.create_context(2, 2)).unwrap();
        let id = renderer.texture_id().unwrap();
        assert!(!seen.contains(&id));
        seen.push(id);
    }
    assert_eq!(display.live_textures().len(), 1);
    assert_eq!(display.live_programs(), 1);
}

#[test]
fn creating_twice_is_idempotent_in_state() {
    let (mut renderer, _slot, display) = setup(2, 2);
    renderer.on_surface_created(display.create_context(2, 2)).unwrap();
    renderer.on_surface_created(display.create_context(2, 2)).unwrap();
    assert_eq!(renderer.state(), RendererState::Ready);
    assert_eq!(display.live_textures().len(), 1);
}

#[test]
fn attribute_locations_come_from_the_shader() {
    let vertex = VERTEX_SHADER
        .replace("@location(0) position", "@location(5) position")
        .replace("@location(1) tex_coord", "@location(2) tex_coord");
    let mut renderer = TextureRenderer::<SoftContext>::with_shaders(
        Arc::new(FrameSlot::new()),
        RenderConfig::default(),
        vertex,
        FRAGMENT_SHADER,
    );
    renderer.on_surface_created(SoftDisplay::new().create_context(2, 2)).unwrap();
    let attrs = renderer.program_state().unwrap().attributes();
    assert_eq!((attrs.position, attrs.tex_coord), (5, 2));
}

// ===== GPU backend =====

#[test]
#[ignore = "requires a GPU adapter"]
fn wgpu_backend_shows_the_newest_frame() {
    use edgecam::gpu::wgpu_context::WgpuContext;

    let slot = Arc::new(FrameSlot::new());
    let mut renderer = TextureRenderer::new(Arc::clone(&slot), RenderConfig::default());
    renderer.on_surface_created(WgpuContext::headless(8, 8).expect("GPU device")).unwrap();
    renderer.on_surface_changed(8, 8);
    assert_eq!(renderer.on_draw_frame().unwrap(), DrawOutcome::Cleared);

    slot.publish(Image::filled(8, 8, 50));
    slot.publish(Image::filled(8, 8, 200));
    assert_eq!(renderer.on_draw_frame().unwrap(), DrawOutcome::Drew(2));
    let pixels = renderer.context_mut().unwrap().read_pixels().unwrap();
    assert!(pixels.pixels().all(|p| p.0 == [200, 200, 200, 255]));
}
