// bin/edgecam.rs
//
// Live edge-map viewer. A capture thread pulls NV21 frames from a source
// (synthetic camera or a directory of images) and runs the edge pipeline;
// the main thread runs the texture renderer once per display tick.
//
// Usage:
//   cargo run --release --bin edgecam
//   cargo run --release --bin edgecam -- --backend wgpu --snapshot edges.png
//   cargo run --release --bin edgecam -- --source frames/ --low 60 --high 80
//   cargo run --release --features window --bin edgecam -- --window
//
// Without --window the renderer draws offscreen for --ticks ticks. With
// --window the rendered frame is read back every tick and shown in a
// minifb window (Esc or Q quits).
//
// Logging goes through tracing; RUST_LOG overrides the default filter.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use thiserror::Error;
use tracing::{error, info, warn};

use edgecam::canny::CannyConfig;
use edgecam::config::{PipelineConfig, RenderConfig};
use edgecam::edge::Thresholds;
use edgecam::gpu::device::DeviceError;
use edgecam::gpu::soft::SoftDisplay;
use edgecam::gpu::wgpu_context::WgpuContext;
use edgecam::gpu::{DrawOutcome, GraphicsContext, RenderError, TextureRenderer};
use edgecam::pipeline::{EdgePipeline, PipelineStats};
use edgecam::slot::FrameSlot;
use edgecam::source::{FrameSource, ImageSequence, SourceError, SyntheticCamera};
use edgecam::LOG_TAG;

/// Interval between resolution/FPS log lines.
const STATS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// CPU rasterizer.
    Soft,
    /// GPU via wgpu (falls back to soft when no adapter is available).
    Wgpu,
}

#[derive(Parser, Debug)]
#[command(name = "edgecam")]
#[command(about = "Camera edge-map viewer: NV21 → Canny → textured quad", long_about = None)]
struct Args {
    /// Rendering backend
    #[arg(long, value_enum, default_value_t = Backend::Soft)]
    backend: Backend,

    /// Directory of PNG/JPEG frames to replay instead of the synthetic camera
    #[arg(long)]
    source: Option<PathBuf>,

    /// Replay --source from the start when it runs out
    #[arg(long)]
    looping: bool,

    /// Synthetic camera width, and the initial display width
    #[arg(long, default_value_t = 640, value_parser = clap::value_parser!(u32).range(1..))]
    width: u32,

    /// Synthetic camera height, and the initial display height
    #[arg(long, default_value_t = 480, value_parser = clap::value_parser!(u32).range(1..))]
    height: u32,

    /// Camera frame rate
    #[arg(long, default_value_t = 30.0)]
    fps: f32,

    /// Display ticks to run (default: until the source ends, or forever with --window)
    #[arg(long)]
    ticks: Option<u64>,

    /// Lower hysteresis threshold
    #[arg(long, default_value_t = Thresholds::CANONICAL.low)]
    low: f32,

    /// Upper hysteresis threshold
    #[arg(long, default_value_t = Thresholds::CANONICAL.high)]
    high: f32,

    /// Use the L2 gradient norm
    #[arg(long)]
    l2: bool,

    /// Write the last rendered frame to this PNG file
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Show the output in a window
    #[cfg(feature = "window")]
    #[arg(long)]
    window: bool,
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("failed to write snapshot: {0}")]
    Snapshot(#[from] image::ImageError),
    #[error("failed to start capture thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[cfg(feature = "window")]
    #[error("window error: {0}")]
    Window(#[from] minifb::Error),
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,naga=warn,wgpu_core=warn,wgpu_hal=warn")),
        )
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(target: LOG_TAG, "{e}");
            ExitCode::FAILURE
        }
    }
}

fn open_source(args: &Args) -> Result<Box<dyn FrameSource>, SourceError> {
    match &args.source {
        Some(dir) => {
            let seq = ImageSequence::open(dir)?.looping(args.looping);
            info!(target: LOG_TAG, "replaying {} images from {}", seq.len(), dir.display());
            Ok(Box::new(seq))
        }
        None => {
            info!(target: LOG_TAG, "synthetic camera {}×{}", args.width, args.height);
            Ok(Box::new(SyntheticCamera::new(args.width as usize, args.height as usize)))
        }
    }
}

fn run(args: &Args) -> Result<(), AppError> {
    let source = open_source(args)?;
    let config = PipelineConfig {
        thresholds: Thresholds::new(args.low, args.high),
        canny: CannyConfig { l2_gradient: args.l2 },
    };
    let slot = Arc::new(FrameSlot::new());
    let running = Arc::new(AtomicBool::new(true));

    let capture = {
        let pipeline = EdgePipeline::canny(config, Arc::clone(&slot));
        let running = Arc::clone(&running);
        let period = Duration::from_secs_f32(1.0 / args.fps.max(1.0));
        thread::Builder::new()
            .name("edgecam-capture".into())
            .spawn(move || capture_loop(source, pipeline, &running, period))?
    };

    let producer = Producer { running: &running, capture: &capture };
    let result = match args.backend {
        Backend::Soft => display(&slot, soft_context(args), args, &producer),
        Backend::Wgpu => match WgpuContext::headless(args.width, args.height) {
            Ok(ctx) => {
                info!(target: LOG_TAG, "rendering on {}", ctx.gpu());
                display(&slot, ctx, args, &producer)
            }
            Err(RenderError::Device(e @ DeviceError::NoSuitableAdapter(_))) => {
                warn!(target: LOG_TAG, "{e}; falling back to the soft renderer");
                display(&slot, soft_context(args), args, &producer)
            }
            Err(e) => Err(e.into()),
        },
    };

    running.store(false, Ordering::Relaxed);
    match capture.join() {
        Ok(stats) => info!(
            target: LOG_TAG,
            processed = stats.processed,
            rejected = stats.rejected,
            recycled = stats.recycled,
            "capture finished"
        ),
        Err(_) => error!(target: LOG_TAG, "capture thread panicked"),
    }
    result
}

fn soft_context(args: &Args) -> edgecam::gpu::soft::SoftContext {
    SoftDisplay::new().create_context(args.width, args.height)
}

/// Producer side: one `process_frame` per source frame, paced to `period`.
fn capture_loop(
    mut source: Box<dyn FrameSource>,
    mut pipeline: EdgePipeline,
    running: &AtomicBool,
    period: Duration,
) -> PipelineStats {
    let _stop = StopOnDrop(running);
    let mut buf = Vec::new();
    while running.load(Ordering::Relaxed) {
        let started = Instant::now();
        let Some((w, h)) = source.next_frame(&mut buf) else {
            info!(target: LOG_TAG, "source exhausted");
            break;
        };
        // Rejected frames are logged by the pipeline; keep going.
        let _ = pipeline.process_frame(w, h, &buf);
        if let Some(rest) = period.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }
    pipeline.stats()
}

/// Clears the running flag when the capture loop ends, panics included.
struct StopOnDrop<'a>(&'a AtomicBool);

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// What the display side knows about the capture thread.
struct Producer<'a> {
    running: &'a AtomicBool,
    capture: &'a JoinHandle<PipelineStats>,
}

impl Producer<'_> {
    fn done(&self) -> bool {
        !self.running.load(Ordering::Relaxed) || self.capture.is_finished()
    }
}

/// Resolution and display rate of the frames actually drawn.
struct FrameStats {
    since: Instant,
    drawn: u32,
    last_sequence: u64,
}

impl FrameStats {
    fn new() -> Self {
        FrameStats { since: Instant::now(), drawn: 0, last_sequence: 0 }
    }

    fn record<C: GraphicsContext>(&mut self, outcome: DrawOutcome, renderer: &TextureRenderer<C>) {
        if let DrawOutcome::Drew(sequence) = outcome {
            if sequence != self.last_sequence {
                self.drawn += 1;
                self.last_sequence = sequence;
            }
        }
        let elapsed = self.since.elapsed();
        if elapsed < STATS_INTERVAL {
            return;
        }
        if let Some(frame) = renderer.slot().latest() {
            info!(
                target: LOG_TAG,
                "{}×{} @ {:.1} fps",
                frame.width(),
                frame.height(),
                self.drawn as f32 / elapsed.as_secs_f32()
            );
        }
        self.since = Instant::now();
        self.drawn = 0;
    }
}

/// Consumer side: create the surface, tick until done, snapshot.
fn display<C: GraphicsContext>(
    slot: &Arc<FrameSlot>,
    ctx: C,
    args: &Args,
    producer: &Producer<'_>,
) -> Result<(), AppError> {
    let mut renderer = TextureRenderer::new(Arc::clone(slot), RenderConfig::default());
    renderer.on_surface_created(ctx)?;
    renderer.on_surface_changed(args.width, args.height);

    #[cfg(feature = "window")]
    {
        if args.window {
            window_loop(&mut renderer, args)?;
            return finish(renderer, args);
        }
    }

    let tick = Duration::from_secs_f32(1.0 / 60.0);
    let mut stats = FrameStats::new();
    let mut n = 0u64;
    while args.ticks.map_or(true, |limit| n < limit) {
        // Sampled before the tick: once the producer is done, this tick
        // draws its last frame and, without a tick limit, is the final one.
        let producer_done = producer.done();
        let started = Instant::now();
        let outcome = renderer.on_draw_frame()?;
        stats.record(outcome, &renderer);
        n += 1;
        if producer_done && args.ticks.is_none() {
            break;
        }
        if let Some(rest) = tick.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }
    finish(renderer, args)
}

/// Write the snapshot, if requested, then tear the surface down.
fn finish<C: GraphicsContext>(mut renderer: TextureRenderer<C>, args: &Args) -> Result<(), AppError> {
    if let (Some(path), Some(ctx)) = (&args.snapshot, renderer.context_mut()) {
        let pixels = ctx.read_pixels()?;
        pixels.save(path)?;
        info!(target: LOG_TAG, "wrote {}×{} snapshot to {}", pixels.width(), pixels.height(), path.display());
    }
    renderer.on_surface_destroyed();
    Ok(())
}

#[cfg(feature = "window")]
fn window_loop<C: GraphicsContext>(renderer: &mut TextureRenderer<C>, args: &Args) -> Result<(), AppError> {
    use edgecam::convert::rgba8_to_0rgb;
    use minifb::{Key, Window, WindowOptions};

    let mut window = Window::new(
        "edgecam",
        args.width as usize,
        args.height as usize,
        WindowOptions {
            resize: true,
            ..WindowOptions::default()
        },
    )?;
    window.set_target_fps(60);

    let mut fb: Vec<u32> = Vec::new();
    let mut size = window.get_size();
    let mut stats = FrameStats::new();
    let mut n = 0u64;

    while window.is_open() && !window.is_key_down(Key::Escape) && !window.is_key_down(Key::Q) {
        if args.ticks.is_some_and(|limit| n >= limit) {
            break;
        }
        let current = window.get_size();
        if current != size && current.0 > 0 && current.1 > 0 {
            size = current;
            renderer.on_surface_changed(size.0 as u32, size.1 as u32);
        }

        let outcome = renderer.on_draw_frame()?;
        stats.record(outcome, renderer);
        n += 1;

        let Some(ctx) = renderer.context_mut() else { break };
        let pixels = ctx.read_pixels()?;
        rgba8_to_0rgb(pixels.as_raw(), &mut fb);
        window.update_with_buffer(&fb, pixels.width() as usize, pixels.height() as usize)?;
    }
    Ok(())
}
