// tests/test_source.rs — Frame sources feeding the pipeline.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::tempdir;

use edgecam::config::PipelineConfig;
use edgecam::frame::{extract_luminance, nv21_len, RawFrame};
use edgecam::pipeline::EdgePipeline;
use edgecam::slot::FrameSlot;
use edgecam::source::{load_luminance, FrameSource, ImageSequence, SourceError, SyntheticCamera};

fn write_gray_png(dir: &Path, name: &str, width: u32, height: u32, value: u8) {
    let img = image::GrayImage::from_pixel(width, height, image::Luma([value]));
    img.save(dir.join(name)).unwrap();
}

#[test]
fn sequence_replays_files_in_name_order() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path();
    write_gray_png(dir, "frame_002.png", 4, 2, 20);
    write_gray_png(dir, "frame_001.png", 4, 2, 10);
    write_gray_png(dir, "frame_003.png", 6, 4, 30);
    fs::write(dir.join("notes.txt"), "not an image").unwrap();

    let mut seq = ImageSequence::open(dir).unwrap();
    assert_eq!(seq.len(), 3);

    let mut buf = Vec::new();
    let mut seen = Vec::new();
    while let Some((w, h)) = seq.next_frame(&mut buf) {
        assert_eq!(buf.len(), nv21_len(w, h));
        let frame = RawFrame::new(&buf, w, h).unwrap();
        seen.push((w, h, extract_luminance(&frame).get(0, 0)));
    }
    assert_eq!(seen, vec![(4, 2, 10), (4, 2, 20), (6, 4, 30)]);
}

#[test]
fn looping_sequence_restarts() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path();
    write_gray_png(dir, "a.png", 2, 2, 1);
    write_gray_png(dir, "b.png", 2, 2, 2);

    let mut seq = ImageSequence::open(dir).unwrap().looping(true);
    let mut buf = Vec::new();
    let values: Vec<u8> = (0..5)
        .map(|_| {
            seq.next_frame(&mut buf).unwrap();
            buf[0]
        })
        .collect();
    assert_eq!(values, vec![1, 2, 1, 2, 1]);
}

#[test]
fn undecodable_files_are_skipped() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("0_broken.png"), b"definitely not a png").unwrap();
    write_gray_png(dir, "1_good.png", 3, 3, 77);

    let mut seq = ImageSequence::open(dir).unwrap();
    let mut buf = Vec::new();
    assert_eq!(seq.next_frame(&mut buf), Some((3, 3)));
    assert_eq!(buf[0], 77);
    assert_eq!(seq.next_frame(&mut buf), None);
}

#[test]
fn directory_without_images_is_an_error() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("readme.md"), "# nothing here").unwrap();
    assert!(matches!(ImageSequence::open(dir), Err(SourceError::Empty(_))));
}

#[test]
fn color_images_load_as_luminance() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path();
    let path = dir.join("white.png");
    image::RgbImage::from_pixel(5, 4, image::Rgb([255, 255, 255])).save(&path).unwrap();

    let luma = load_luminance(&path).unwrap();
    assert_eq!((luma.width(), luma.height()), (5, 4));
    assert!(luma.pixels().all(|(_, _, v)| v == 255));
}

#[test]
fn synthetic_camera_drives_the_pipeline() {
    let slot = Arc::new(FrameSlot::new());
    let mut pipeline = EdgePipeline::canny(PipelineConfig::default(), Arc::clone(&slot));
    let mut camera = SyntheticCamera::new(64, 48).with_limit(5);

    let mut buf = Vec::new();
    while let Some((w, h)) = camera.next_frame(&mut buf) {
        pipeline.process_frame(w, h, &buf).unwrap();
    }
    assert_eq!(pipeline.stats().processed, 5);
    assert_eq!(slot.published(), 5);

    // The bright rectangle stands out from the ramp: its outline is found.
    let latest = slot.latest().unwrap();
    assert_eq!((latest.width(), latest.height()), (64, 48));
    assert!(latest.image().pixels().any(|(_, _, v)| v != 0));
}

#[test]
fn zero_width_camera_frames_are_rejected_not_fatal() {
    let slot = Arc::new(FrameSlot::new());
    let mut pipeline = EdgePipeline::canny(PipelineConfig::default(), Arc::clone(&slot));
    let mut camera = SyntheticCamera::new(0, 48).with_limit(3);

    let mut buf = Vec::new();
    while let Some((w, h)) = camera.next_frame(&mut buf) {
        assert!(pipeline.process_frame(w, h, &buf).is_err());
    }
    assert_eq!(pipeline.stats().rejected, 3);
    assert!(slot.latest().is_none());
}
