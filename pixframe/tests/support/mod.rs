#![allow(dead_code)]

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use image::codecs::gif::GifEncoder;
use image::{Delay, Frame, Rgba, RgbaImage};
use pixframe::prelude::*;

pub const CANVAS_SIZE: (u32, u32) = (4, 4);

/// Polls `condition` until it holds or five seconds pass.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

pub fn temp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let dir = std::env::temp_dir()
        .join(format!("pixframe_it_{}_{}", name, nanos));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

pub fn solid(rgb: [u8; 3]) -> RgbaImage {
    RgbaImage::from_pixel(2, 2, Rgba([rgb[0], rgb[1], rgb[2], 255]))
}

pub fn write_gif(path: &Path, colors: &[[u8; 3]]) {
    let file = File::create(path).expect("create gif");
    let mut encoder = GifEncoder::new(file);
    let frames = colors.iter().map(|rgb| {
        Frame::from_parts(solid(*rgb), 0, 0, Delay::from_numer_denom_ms(50, 1))
    });
    encoder.encode_frames(frames).expect("encode gif");
}

/// Replaces `path` in one step so watchers never see a half-written file.
pub fn replace_gif(path: &Path, colors: &[[u8; 3]]) {
    let staging = path.with_extension("staging");
    write_gif(&staging, colors);
    fs::rename(&staging, path).expect("rename gif");
}

pub fn fast_playback() -> PlaybackConfig {
    PlaybackConfig {
        framerate_divisor: 1,
        check_every_frames: 4,
        idle_poll_ms: 5,
        max_canvas_reinit: 3,
        reinit_backoff_ms: 1,
    }
}

pub fn powered(source_id: &str, brightness_percent: u8) -> DisplaySettings {
    DisplaySettings {
        source_id: source_id.to_string(),
        powered: true,
        brightness_percent,
    }
}

pub fn memory_canvas(log: &CanvasLog) -> CanvasFactory {
    MemoryCanvas::factory(CANVAS_SIZE.0, CANVAS_SIZE.1, 10_000.0, log.clone())
}

pub fn center_color(frame: &image::RgbImage) -> [u8; 3] {
    frame.get_pixel(CANVAS_SIZE.0 / 2, CANVAS_SIZE.1 / 2).0
}

pub fn last_color(log: &CanvasLog) -> Option<[u8; 3]> {
    log.submitted().last().map(center_color)
}
