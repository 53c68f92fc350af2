// pipeline.rs — Camera callback → luminance → edges → shared slot.
//
// `EdgePipeline::process_frame` is the producer side of the system. It runs
// on whatever thread the camera delivers frames on, once per frame:
//
//   1. Wrap the camera bytes as a RawFrame (borrowed for this call only).
//   2. Take a zero-copy luminance view.
//   3. Run the edge detector into a reusable output buffer.
//   4. Publish the buffer to the FrameSlot; reclaim the replaced buffer if
//      the renderer has let go of it.
//
// Nothing derived from the camera bytes escapes the call: the RawFrame and
// the luminance view are both bounded by the lifetime of `raw`.

use std::sync::Arc;

use tracing::{trace, warn};

use crate::canny::CannyDetector;
use crate::config::PipelineConfig;
use crate::edge::EdgeDetector;
use crate::frame::{extract_luminance, FrameError, RawFrame};
use crate::image::Image;
use crate::slot::FrameSlot;
use crate::LOG_TAG;

/// Per-pipeline counters, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Frames processed and published.
    pub processed: u64,
    /// Frames rejected for inconsistent geometry.
    pub rejected: u64,
    /// Publishes that reused the previous output allocation.
    pub recycled: u64,
}

/// The producer: owns the detector and the spare output buffer.
pub struct EdgePipeline<D: EdgeDetector = CannyDetector> {
    detector: D,
    config: PipelineConfig,
    slot: Arc<FrameSlot>,
    /// Buffer reclaimed from the previous publish, reused for the next one.
    spare: Option<Image<u8>>,
    stats: PipelineStats,
}

impl EdgePipeline<CannyDetector> {
    /// A pipeline running the built-in Canny detector.
    pub fn canny(config: PipelineConfig, slot: Arc<FrameSlot>) -> Self {
        let detector = CannyDetector::new(config.canny);
        Self::new(detector, config, slot)
    }
}

impl<D: EdgeDetector> EdgePipeline<D> {
    pub fn new(detector: D, config: PipelineConfig, slot: Arc<FrameSlot>) -> Self {
        EdgePipeline {
            detector,
            config,
            slot,
            spare: None,
            stats: PipelineStats::default(),
        }
    }

    /// The slot this pipeline publishes into.
    pub fn slot(&self) -> &Arc<FrameSlot> {
        &self.slot
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Process one NV21 camera frame and publish its edge map.
    ///
    /// Returns the sequence number of the published frame. A frame whose
    /// buffer does not match `width`/`height` is logged and rejected; the
    /// slot keeps its previous contents.
    pub fn process_frame(&mut self, width: usize, height: usize, raw: &[u8]) -> Result<u64, FrameError> {
        let frame = match RawFrame::new(raw, width, height) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.rejected += 1;
                warn!(target: LOG_TAG, "dropping camera frame: {e}");
                return Err(e);
            }
        };
        let luminance = extract_luminance(&frame);

        let mut output = self.spare.take().unwrap_or_default();
        self.detector.detect(&luminance, self.config.thresholds, &mut output);
        debug_assert_eq!((output.width(), output.height()), (width, height));

        let (sequence, previous) = self.slot.publish(output);
        // Reclaim the replaced buffer unless the renderer still holds it.
        if let Some(previous) = previous {
            if let Ok(frame) = Arc::try_unwrap(previous) {
                self.spare = Some(frame.into_image());
                self.stats.recycled += 1;
            }
        }
        self.stats.processed += 1;
        trace!(target: LOG_TAG, sequence, width, height, "published edge map");
        Ok(sequence)
    }
}
