use image::RgbImage;
use log::info;
use rpi_led_matrix::{
    LedCanvas, LedColor, LedMatrix, LedMatrixOptions, LedRuntimeOptions,
};

use super::canvas::{Canvas, CanvasFactory, check_frame_size};
use crate::config::PanelConfig;
use crate::error::DisplayError;

/// HUB75 panel driven through the rpi-rgb-led-matrix library.
pub struct LedMatrixCanvas {
    matrix: LedMatrix,
    offscreen: Option<LedCanvas>,
    width: u32,
    height: u32,
    refresh_hz: f32,
}

impl LedMatrixCanvas {
    pub fn open(panel: &PanelConfig) -> Result<Self, DisplayError> {
        let mut options = LedMatrixOptions::new();
        options.set_rows(panel.rows);
        options.set_cols(panel.cols);
        options.set_chain_length(panel.chain_length);
        options.set_parallel(panel.parallel);
        options.set_hardware_mapping(&panel.hardware_mapping);
        if !panel.pixel_mapper.is_empty() {
            options.set_pixel_mapper_config(&panel.pixel_mapper);
        }

        let mut runtime_options = LedRuntimeOptions::new();
        runtime_options.set_gpio_slowdown(panel.gpio_slowdown);

        let matrix = LedMatrix::new(Some(options), Some(runtime_options))
            .map_err(|err| DisplayError::Hardware(err.to_string()))?;

        let offscreen = matrix.offscreen_canvas();
        let (width, height) = offscreen.canvas_size();
        info!("Opened {}x{} LED matrix", width, height);

        Ok(Self {
            matrix,
            offscreen: Some(offscreen),
            width: width.max(0) as u32,
            height: height.max(0) as u32,
            refresh_hz: panel.refresh_hz.max(1.0),
        })
    }

    pub fn factory(panel: PanelConfig) -> CanvasFactory {
        Box::new(move || {
            Ok(Box::new(LedMatrixCanvas::open(&panel)?) as Box<dyn Canvas>)
        })
    }

    fn swap_with<F>(&mut self, draw: F) -> Result<(), DisplayError>
    where
        F: FnOnce(&mut LedCanvas),
    {
        let mut canvas = self.offscreen.take().ok_or_else(|| {
            DisplayError::Hardware("offscreen canvas was lost".to_string())
        })?;
        draw(&mut canvas);
        self.offscreen = Some(self.matrix.swap(canvas));
        Ok(())
    }
}

impl Canvas for LedMatrixCanvas {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn refresh_rate_hz(&self) -> f32 {
        self.refresh_hz
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        self.swap_with(|canvas| canvas.clear())
    }

    fn submit_frame(&mut self, frame: &RgbImage) -> Result<(), DisplayError> {
        check_frame_size(frame, self.dimensions())?;
        self.swap_with(|canvas| {
            for (x, y, pixel) in frame.enumerate_pixels() {
                let [red, green, blue] = pixel.0;
                canvas.set(x as i32, y as i32, &LedColor { red, green, blue });
            }
        })
    }
}
