// tests/test_image.rs — Integration tests for Image<T>, ImageView, NV21
// frames and pixel conversions.
//
// These run with `cargo test --test test_image`.
// Integration tests only see the crate's public API, which is what the
// camera glue and the renderer use.

use edgecam::convert;
use edgecam::frame::{extract_luminance, nv21_len, FrameError, RawFrame};
use edgecam::image::{Image, ImageView};

/// NV21 buffer whose luminance byte at (x, y) is `x * 10 + y` and whose
/// chroma bytes are 128.
fn nv21_gradient(width: usize, height: usize) -> Vec<u8> {
    let mut buf = vec![128u8; nv21_len(width, height)];
    for y in 0..height {
        for x in 0..width {
            buf[y * width + x] = (x * 10 + y) as u8;
        }
    }
    buf
}

// ===== Image construction & basic access =====

#[test]
fn image_new_zero_initialized() {
    let img: Image<u8> = Image::new(100, 50);
    assert_eq!(img.width(), 100);
    assert_eq!(img.height(), 50);
    assert_eq!(img.get(0, 0), 0);
    assert_eq!(img.get(99, 49), 0);
}

#[test]
fn image_from_vec_layout() {
    // 3×2 image, row-major:
    //  [10, 20, 30]
    //  [40, 50, 60]
    let img = Image::from_vec(3, 2, vec![10u8, 20, 30, 40, 50, 60]);
    assert_eq!(img.get(0, 0), 10);
    assert_eq!(img.get(2, 0), 30);
    assert_eq!(img.get(0, 1), 40);
    assert_eq!(img.get(2, 1), 60);
    assert_eq!(img.row(1), &[40, 50, 60]);
}

#[test]
fn image_default_is_empty_and_resizable() {
    let mut img: Image<u8> = Image::default();
    assert!(img.is_empty());
    img.resize(4, 3);
    assert_eq!((img.width(), img.height(), img.stride()), (4, 3, 4));
    assert_eq!(img.as_slice().len(), 12);
}

#[test]
fn image_pixels_visits_row_major() {
    let img = Image::from_vec(2, 2, vec![1u8, 2, 3, 4]);
    let seen: Vec<_> = img.pixels().collect();
    assert_eq!(seen, vec![(0, 0, 1), (1, 0, 2), (0, 1, 3), (1, 1, 4)]);
}

// ===== Views =====

#[test]
fn sub_image_coordinates() {
    // 5×5 image with pixel value = x * 10 + y
    let mut img: Image<u8> = Image::new(5, 5);
    for y in 0..5 {
        for x in 0..5 {
            img.set(x, y, (x * 10 + y) as u8);
        }
    }
    let sub = img.sub_image(1, 2, 3, 2);
    assert_eq!((sub.width(), sub.height()), (3, 2));
    assert_eq!(sub.get(0, 0), 12);
    assert_eq!(sub.get(2, 1), 33);

    let nested = sub.sub_view(1, 1, 2, 1);
    assert_eq!(nested.get(0, 0), 23);
    assert_eq!(nested.get(1, 0), 33);
}

#[test]
fn view_with_padding_ignores_padding_bytes() {
    // Width 3, stride 5: the last two bytes of each row are padding.
    let data = [1u8, 2, 3, 99, 99, 4, 5, 6, 99, 99];
    let view = ImageView::from_slice(&data, 3, 2, 5);
    assert_eq!(view.row(0), &[1, 2, 3]);
    assert_eq!(view.row(1), &[4, 5, 6]);
    let owned = view.to_owned_image();
    assert_eq!(owned.as_slice(), &[1, 2, 3, 4, 5, 6]);
}

#[test]
#[should_panic]
fn view_rejects_short_slice() {
    let data = [0u8; 5];
    let _ = ImageView::from_slice(&data, 3, 2, 3);
}

// ===== NV21 frames =====

#[test]
fn luminance_view_has_frame_geometry() {
    let (w, h) = (16, 8);
    let buf = nv21_gradient(w, h);
    let frame = RawFrame::new(&buf, w, h).unwrap();
    let y = extract_luminance(&frame);
    assert_eq!((y.width(), y.height(), y.stride()), (w, h, w));
}

#[test]
fn luminance_matches_frame_bytes() {
    let (w, h) = (7, 6);
    let buf = nv21_gradient(w, h);
    let frame = RawFrame::new(&buf, w, h).unwrap();
    let y = extract_luminance(&frame);
    for (x, row, v) in y.pixels() {
        assert_eq!(v, buf[row * w + x], "mismatch at ({x}, {row})");
        assert_eq!(v, (x * 10 + row) as u8);
    }
}

#[test]
fn luminance_never_reads_chroma() {
    let (w, h) = (4, 4);
    let mut buf = nv21_gradient(w, h);
    // Poison the chroma plane; the luminance view must be unaffected.
    for b in &mut buf[w * h..] {
        *b = 0xEE;
    }
    let frame = RawFrame::new(&buf, w, h).unwrap();
    let y = extract_luminance(&frame);
    assert!(y.pixels().all(|(_, _, v)| v != 0xEE));
}

#[test]
fn luminance_is_zero_copy() {
    let buf = nv21_gradient(10, 4);
    let frame = RawFrame::new(&buf, 10, 4).unwrap();
    let y = extract_luminance(&frame);
    for row in 0..4 {
        assert_eq!(y.row(row).as_ptr(), buf[row * 10..].as_ptr());
    }
}

#[test]
fn short_buffer_rejected() {
    let buf = vec![0u8; nv21_len(8, 8) - 1];
    let err = RawFrame::new(&buf, 8, 8).unwrap_err();
    assert_eq!(
        err,
        FrameError::BufferTooShort { width: 8, height: 8, expected: 96, actual: 95 }
    );
}

#[test]
fn zero_dimensions_rejected() {
    let buf = vec![0u8; 16];
    assert!(matches!(
        RawFrame::new(&buf, 0, 4),
        Err(FrameError::EmptyDimensions { width: 0, height: 4 })
    ));
}

#[test]
fn odd_dimensions_accepted() {
    let (w, h) = (5, 3);
    let buf = nv21_gradient(w, h);
    let frame = RawFrame::new(&buf, w, h).unwrap();
    assert_eq!(extract_luminance(&frame).get(4, 2), 42);
}

// ===== Conversions =====

#[test]
fn luma_to_nv21_round_trips_through_frame() {
    let luma = Image::from_vec(4, 2, vec![0u8, 10, 20, 30, 40, 50, 60, 70]);
    let mut buf = Vec::new();
    convert::luma_to_nv21(&luma, &mut buf);
    assert_eq!(buf.len(), nv21_len(4, 2));
    assert!(buf[8..].iter().all(|&b| b == convert::NEUTRAL_CHROMA));

    let frame = RawFrame::new(&buf, 4, 2).unwrap();
    assert_eq!(extract_luminance(&frame).to_owned_image(), luma);
}

#[test]
fn clear_color_conversion() {
    assert_eq!(convert::color_to_rgba8([0.0, 0.0, 0.0, 1.0]), [0, 0, 0, 255]);
    assert_eq!(convert::color_to_rgba8([1.0, 0.5, -1.0, 2.0]), [255, 128, 0, 255]);
}

#[test]
fn rgba_to_window_pixels() {
    let mut out = Vec::new();
    convert::rgba8_to_0rgb(&[0x11, 0x22, 0x33, 0xFF, 1, 2, 3, 0], &mut out);
    assert_eq!(out, vec![0x0011_2233, 0x0001_0203]);
}
