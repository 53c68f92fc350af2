// config.rs — Pipeline and renderer configuration.
//
// Plain structs with `Default`; the binary maps its CLI flags onto them.

use crate::canny::CannyConfig;
use crate::edge::Thresholds;

/// Edge pipeline configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    /// Hysteresis thresholds passed to the detector on every frame.
    pub thresholds: Thresholds,
    /// Settings for the built-in Canny detector.
    pub canny: CannyConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            thresholds: Thresholds::CANONICAL,
            canny: CannyConfig::default(),
        }
    }
}

/// Texture renderer configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderConfig {
    /// RGBA clear color, applied at the start of every tick.
    pub clear_color: [f32; 4],
}

impl Default for RenderConfig {
    /// Opaque black.
    fn default() -> Self {
        RenderConfig {
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}
