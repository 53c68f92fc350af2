// slot.rs — Single-slot, latest-wins handoff between producer and renderer.
//
// The camera thread publishes edge maps; the render thread draws whatever is
// newest when its tick arrives. There is no queue: a slow renderer skips
// frames, a fast renderer draws the same frame again.
//
// Each publish moves a complete, immutable `EdgeFrame` into an `Arc` and
// swaps the slot's pointer under a mutex. The lock is held only for the
// pointer swap (or the `Arc` clone on the read side), never while pixels are
// written or uploaded. A reader therefore always sees width, height and
// pixels from the same publish: no torn reads and no stale dimensions after a
// resize.
//
// The previous snapshot is handed back to the producer. If the renderer is
// no longer holding it, the producer reclaims its pixel buffer for the next
// frame, so steady-state operation is a double buffer with no per-frame
// allocation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::image::Image;

/// One published edge map.
#[derive(Debug)]
pub struct EdgeFrame {
    image: Image<u8>,
    sequence: u64,
}

impl EdgeFrame {
    /// The single-channel edge map.
    pub fn image(&self) -> &Image<u8> {
        &self.image
    }

    pub fn width(&self) -> usize {
        self.image.width()
    }

    pub fn height(&self) -> usize {
        self.image.height()
    }

    /// Publish counter: 1 for the first frame, strictly increasing.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Take back the pixel buffer for reuse.
    pub fn into_image(self) -> Image<u8> {
        self.image
    }
}

/// The shared slot. Create once, share via `Arc` between the pipeline and
/// the renderer.
#[derive(Debug, Default)]
pub struct FrameSlot {
    current: Mutex<Option<Arc<EdgeFrame>>>,
    published: AtomicU64,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame with `image`.
    ///
    /// Returns the sequence number assigned to the new frame and the
    /// snapshot it replaced, if any.
    pub fn publish(&self, image: Image<u8>) -> (u64, Option<Arc<EdgeFrame>>) {
        let mut current = self.current.lock();
        let sequence = self.published.fetch_add(1, Ordering::Relaxed) + 1;
        let previous = current.replace(Arc::new(EdgeFrame { image, sequence }));
        (sequence, previous)
    }

    /// The newest published frame, or `None` before the first publish.
    pub fn latest(&self) -> Option<Arc<EdgeFrame>> {
        self.current.lock().clone()
    }

    /// True before the first publish and after `clear`.
    pub fn is_empty(&self) -> bool {
        self.current.lock().is_none()
    }

    /// Drop the current frame; the slot reads as empty afterwards.
    pub fn clear(&self) -> Option<Arc<EdgeFrame>> {
        self.current.lock().take()
    }

    /// Total number of publishes since creation.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_empty_before_first_publish() {
        let slot = FrameSlot::new();
        assert!(slot.latest().is_none());
        assert!(slot.is_empty());
        assert_eq!(slot.published(), 0);
    }

    #[test]
    fn test_latest_wins() {
        let slot = FrameSlot::new();
        slot.publish(Image::filled(2, 2, 10));
        let (seq, previous) = slot.publish(Image::filled(3, 1, 20));
        assert_eq!(seq, 2);
        assert_eq!(previous.unwrap().sequence(), 1);

        let latest = slot.latest().unwrap();
        assert_eq!((latest.width(), latest.height()), (3, 1));
        assert!(latest.image().pixels().all(|(_, _, v)| v == 20));
    }

    #[test]
    fn test_reader_snapshot_survives_publish() {
        let slot = FrameSlot::new();
        slot.publish(Image::filled(2, 2, 1));
        let held = slot.latest().unwrap();
        let (_, previous) = slot.publish(Image::filled(4, 4, 2));

        // The renderer still holds frame 1, so the producer cannot reclaim it.
        let previous = previous.unwrap();
        assert!(Arc::ptr_eq(&held, &previous));
        assert!(Arc::try_unwrap(previous).is_err());
        assert_eq!(held.width(), 2);
        assert!(held.image().pixels().all(|(_, _, v)| v == 1));
    }

    #[test]
    fn test_clear() {
        let slot = FrameSlot::new();
        slot.publish(Image::filled(1, 1, 5));
        assert!(slot.clear().is_some());
        assert!(slot.latest().is_none());
        assert_eq!(slot.published(), 1);
    }

    #[test]
    fn test_concurrent_reads_never_tear() {
        // Each published frame is uniform with value == size, so any mix of
        // dimensions and pixels from different publishes is detectable.
        let slot = Arc::new(FrameSlot::new());
        let writer = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                for i in 0..500usize {
                    let n = 1 + i % 7;
                    slot.publish(Image::filled(n, n, n as u8));
                }
            })
        };

        let mut last_seq = 0;
        for _ in 0..2000 {
            if let Some(frame) = slot.latest() {
                let n = frame.width();
                assert_eq!(frame.height(), n);
                assert!(frame.image().pixels().all(|(_, _, v)| v as usize == n));
                assert!(frame.sequence() >= last_seq, "sequence went backwards");
                last_seq = frame.sequence();
            }
        }
        writer.join().unwrap();
        assert_eq!(slot.published(), 500);
    }
}
