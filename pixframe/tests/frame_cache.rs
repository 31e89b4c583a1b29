mod support;

use image::{Rgba, RgbaImage};
use pixframe::prelude::*;
use support::{powered, temp_dir, write_gif};

fn gradient(width: u32, height: u32, seed: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let v = (x * 37 + y * 11 + seed * 53) % 256;
        Rgba([v as u8, (255 - v) as u8, (v * 3 % 256) as u8, 255])
    })
}

fn raw(frames: Vec<RgbaImage>) -> RawSource {
    RawSource {
        source_id: "gradient.gif".to_string(),
        frames,
    }
}

#[test]
fn build_is_deterministic() {
    let source = raw((0..5).map(|seed| gradient(17, 9, seed)).collect());
    let settings = powered("gradient.gif", 73);

    let first = build_frames(&source, &settings, 4, (32, 16)).unwrap();
    let second = build_frames(&source, &settings, 4, (32, 16)).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.len(), 5);
    assert_eq!((first.width, first.height), (32, 16));
}

#[test]
fn brightness_is_monotonic() {
    let source = raw(vec![gradient(8, 8, 1), gradient(8, 8, 2)]);
    let builds: Vec<FrameSequence> = (0..=100)
        .map(|percent| {
            build_frames(&source, &powered("gradient.gif", percent), 0, (8, 8))
                .unwrap()
        })
        .collect();

    for pair in builds.windows(2) {
        let (dim, bright) = (&pair[0], &pair[1]);
        for (a, b) in dim.frames.iter().zip(&bright.frames) {
            for (p, q) in a.pixels().zip(b.pixels()) {
                assert!(p.0.iter().zip(q.0.iter()).all(|(x, y)| x <= y));
            }
        }
    }
}

#[test]
fn three_frame_gif_at_half_brightness() {
    let dir = temp_dir("half");
    write_gif(
        &dir.join("abc.gif"),
        &[[200, 40, 0], [0, 200, 90], [10, 20, 250]],
    );

    let decoded = GifDirectoryDecoder::new(&dir).decode("abc.gif").unwrap();
    let sequence =
        build_frames(&decoded, &powered("abc.gif", 50), 1, (2, 2)).unwrap();

    assert_eq!(sequence.len(), 3);
    for (raw_frame, built) in decoded.frames.iter().zip(&sequence.frames) {
        for (raw_pixel, pixel) in raw_frame.pixels().zip(built.pixels()) {
            let [r, g, b, _] = raw_pixel.0;
            assert_eq!(pixel.0, [r / 2, g / 2, b / 2]);
        }
    }

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn zero_frames_fail_with_decode_failure_reason() {
    let err = build_frames(&raw(vec![]), &powered("x.gif", 100), 0, (8, 8))
        .unwrap_err();
    assert_eq!(
        err,
        DisplayError::Build {
            reason: "decode failure".to_string()
        }
    );
}
