use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage, RgbaImage};
use rayon::prelude::*;

use crate::error::DisplayError;
use crate::io::decoder::RawSource;
use crate::settings::DisplaySettings;

/// Frames ready to hand straight to a canvas. Never empty.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameSequence {
    pub generation: u64,
    pub source_id: String,
    pub frames: Vec<RgbImage>,
    pub width: u32,
    pub height: u32,
}

impl FrameSequence {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Scales every raw frame to `target` and applies the brightness setting.
///
/// Output is a pure function of the inputs, so a rebuild can always be
/// retried and two builds of the same inputs are bit-identical.
pub fn build_frames(
    raw: &RawSource,
    settings: &DisplaySettings,
    generation: u64,
    target: (u32, u32),
) -> Result<FrameSequence, DisplayError> {
    if raw.frames.is_empty() {
        return Err(DisplayError::build("decode failure"));
    }

    let (width, height) = target;
    if width == 0 || height == 0 {
        return Err(DisplayError::build(format!(
            "canvas has no area ({}x{})",
            width, height
        )));
    }

    let brightness = settings.brightness_percent.min(100);
    let frames = raw
        .frames
        .par_iter()
        .map(|frame| render_frame(frame, width, height, brightness))
        .collect::<Vec<_>>();

    Ok(FrameSequence {
        generation,
        source_id: raw.source_id.clone(),
        frames,
        width,
        height,
    })
}

fn render_frame(
    frame: &RgbaImage,
    width: u32,
    height: u32,
    brightness: u8,
) -> RgbImage {
    let (fit_w, fit_h) = fit_within(frame.dimensions(), (width, height));
    let scaled;
    let source = if (fit_w, fit_h) == frame.dimensions() {
        frame
    } else {
        scaled = imageops::resize(frame, fit_w, fit_h, FilterType::Nearest);
        &scaled
    };

    let offset_x = (width - fit_w) / 2;
    let offset_y = (height - fit_h) / 2;
    let mut out = RgbImage::new(width, height);

    for (x, y, pixel) in source.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        out.put_pixel(
            offset_x + x,
            offset_y + y,
            Rgb([
                dim_channel(r, a, brightness),
                dim_channel(g, a, brightness),
                dim_channel(b, a, brightness),
            ]),
        );
    }

    out
}

/// Largest size with the source aspect ratio that fits inside `bounds`.
pub fn fit_within(size: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (w, h) = (size.0.max(1) as u64, size.1.max(1) as u64);
    let (bw, bh) = (bounds.0 as u64, bounds.1 as u64);

    if w * bh >= h * bw {
        (bw as u32, ((h * bw) / w).clamp(1, bh) as u32)
    } else {
        (((w * bh) / h).clamp(1, bw) as u32, bh as u32)
    }
}

/// Transparent pixels go to black, then the channel is scaled by
/// `brightness / 100`.
fn dim_channel(value: u8, alpha: u8, brightness: u8) -> u8 {
    let scaled =
        value as u32 * alpha as u32 * brightness as u32 / (255 * 100);
    scaled.min(u8::MAX as u32) as u8
}
