use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use image::RgbImage;

use crate::error::DisplayError;

/// Hardware-facing surface that shows one fully rendered frame at a time.
pub trait Canvas {
    fn dimensions(&self) -> (u32, u32);

    /// Native swap cadence; playback runs at a fraction of it.
    fn refresh_rate_hz(&self) -> f32;

    fn clear(&mut self) -> Result<(), DisplayError>;

    /// Swaps `frame` onto the display, returning after the sync boundary.
    fn submit_frame(&mut self, frame: &RgbImage) -> Result<(), DisplayError>;
}

/// Opens a canvas on the playback thread, and again after hardware failures.
pub type CanvasFactory =
    Box<dyn FnMut() -> Result<Box<dyn Canvas>, DisplayError> + Send>;

pub(crate) fn check_frame_size(
    frame: &RgbImage,
    expected: (u32, u32),
) -> Result<(), DisplayError> {
    if frame.dimensions() == expected {
        Ok(())
    } else {
        Err(DisplayError::Hardware(format!(
            "frame is {}x{} but canvas is {}x{}",
            frame.width(),
            frame.height(),
            expected.0,
            expected.1
        )))
    }
}

/// Software canvas that only keeps time. Used without the `hardware`
/// feature.
#[derive(Debug)]
pub struct HeadlessCanvas {
    width: u32,
    height: u32,
    refresh_hz: f32,
    frames_submitted: u64,
}

impl HeadlessCanvas {
    pub fn new(width: u32, height: u32, refresh_hz: f32) -> Self {
        Self {
            width,
            height,
            refresh_hz: refresh_hz.max(1.0),
            frames_submitted: 0,
        }
    }

    pub fn factory(width: u32, height: u32, refresh_hz: f32) -> CanvasFactory {
        Box::new(move || {
            Ok(Box::new(HeadlessCanvas::new(width, height, refresh_hz))
                as Box<dyn Canvas>)
        })
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }
}

impl Canvas for HeadlessCanvas {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn refresh_rate_hz(&self) -> f32 {
        self.refresh_hz
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        Ok(())
    }

    fn submit_frame(&mut self, frame: &RgbImage) -> Result<(), DisplayError> {
        check_frame_size(frame, self.dimensions())?;
        thread::sleep(Duration::from_secs_f32(1.0 / self.refresh_hz));
        self.frames_submitted += 1;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CanvasCall {
    Clear,
    Submit(RgbImage),
}

#[derive(Debug, Default)]
struct CanvasLogInner {
    calls: Vec<CanvasCall>,
    opens: u32,
    failing_opens: u32,
    failing_submits: u32,
}

/// Shared record of everything a [`MemoryCanvas`] was asked to do.
#[derive(Clone, Debug, Default)]
pub struct CanvasLog {
    inner: Arc<Mutex<CanvasLogInner>>,
}

impl CanvasLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CanvasLogInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn calls(&self) -> Vec<CanvasCall> {
        self.lock().calls.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().calls.is_empty()
    }

    pub fn submitted(&self) -> Vec<RgbImage> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                CanvasCall::Submit(frame) => Some(frame.clone()),
                CanvasCall::Clear => None,
            })
            .collect()
    }

    pub fn clear_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, CanvasCall::Clear))
            .count()
    }

    /// How many times the factory produced (or tried to produce) a canvas.
    pub fn opens(&self) -> u32 {
        self.lock().opens
    }

    /// The next `count` submissions fail with a hardware error.
    pub fn fail_submits(&self, count: u32) {
        self.lock().failing_submits = count;
    }

    /// The next `count` factory calls fail with a hardware error.
    pub fn fail_opens(&self, count: u32) {
        self.lock().failing_opens = count;
    }
}

/// Canvas that records calls instead of driving hardware.
#[derive(Debug)]
pub struct MemoryCanvas {
    width: u32,
    height: u32,
    refresh_hz: f32,
    log: CanvasLog,
}

impl MemoryCanvas {
    pub fn new(
        width: u32,
        height: u32,
        refresh_hz: f32,
        log: CanvasLog,
    ) -> Self {
        Self {
            width,
            height,
            refresh_hz: refresh_hz.max(1.0),
            log,
        }
    }

    pub fn factory(
        width: u32,
        height: u32,
        refresh_hz: f32,
        log: CanvasLog,
    ) -> CanvasFactory {
        Box::new(move || {
            let mut inner = log.lock();
            inner.opens += 1;
            if inner.failing_opens > 0 {
                inner.failing_opens -= 1;
                return Err(DisplayError::Hardware(
                    "memory canvas refused to open".to_string(),
                ));
            }
            drop(inner);

            Ok(Box::new(MemoryCanvas::new(
                width,
                height,
                refresh_hz,
                log.clone(),
            )) as Box<dyn Canvas>)
        })
    }
}

impl Canvas for MemoryCanvas {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn refresh_rate_hz(&self) -> f32 {
        self.refresh_hz
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        self.log.lock().calls.push(CanvasCall::Clear);
        Ok(())
    }

    fn submit_frame(&mut self, frame: &RgbImage) -> Result<(), DisplayError> {
        check_frame_size(frame, self.dimensions())?;

        let mut inner = self.log.lock();
        if inner.failing_submits > 0 {
            inner.failing_submits -= 1;
            return Err(DisplayError::Hardware(
                "memory canvas submission failed".to_string(),
            ));
        }
        inner.calls.push(CanvasCall::Submit(frame.clone()));
        Ok(())
    }
}
