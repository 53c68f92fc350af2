// edgecam: live camera edge-map viewer
//
// NV21 preview frames → luminance view → Canny edge map → single-slot
// handoff → texture drawn on a full-screen quad.
//
// Two threads meet at `FrameSlot`: the capture side runs `EdgePipeline`
// once per camera frame, the display side runs `TextureRenderer` once per
// display tick. Neither ever waits on the other beyond a short lock.

pub mod image;
pub mod convert;
pub mod convolution;
pub mod gradient;
pub mod frame;
pub mod edge;
pub mod canny;
pub mod slot;
pub mod config;
pub mod pipeline;
pub mod source;
pub mod gpu;

/// `tracing` target for everything this crate logs.
pub const LOG_TAG: &str = "edgecam";
