use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

const FPS_WINDOW: usize = 64;

/// Paces frame submission against a running deadline.
///
/// A late frame goes out immediately and the schedule restarts from it, so
/// a stall never turns into a burst of catch-up frames.
#[derive(Debug)]
pub struct FrameClock {
    interval: Duration,
    deadline: Option<Instant>,
    shown: VecDeque<Instant>,
}

impl FrameClock {
    pub fn new(fps: f32) -> Self {
        Self {
            interval: Duration::from_secs_f32(1.0 / fps.max(1.0)),
            deadline: None,
            shown: VecDeque::with_capacity(FPS_WINDOW),
        }
    }

    /// Clock running at the canvas cadence divided by `divisor`.
    pub fn for_refresh_rate(refresh_hz: f32, divisor: u32) -> Self {
        Self::new(refresh_hz / divisor.max(1) as f32)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Forgets the schedule. The next frame is due as soon as it is asked
    /// for.
    pub fn reset(&mut self) {
        self.deadline = None;
        self.shown.clear();
    }

    /// Sleeps until the next frame is due.
    pub fn wait_for_next_frame(&mut self) {
        let due = self.claim(Instant::now());
        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
        }
    }

    /// Frames per second over the most recent frames, 0 until two are shown.
    pub fn average_fps(&self) -> f32 {
        let (Some(first), Some(last)) = (self.shown.front(), self.shown.back())
        else {
            return 0.0;
        };
        let span = last.saturating_duration_since(*first);
        if span.is_zero() {
            return 0.0;
        }
        (self.shown.len() - 1) as f32 / span.as_secs_f32()
    }

    /// Books the next frame slot at or after `now` and returns when it is
    /// due.
    fn claim(&mut self, now: Instant) -> Instant {
        let due = match self.deadline {
            Some(deadline) if deadline > now => deadline,
            _ => now,
        };
        self.deadline = Some(due + self.interval);

        if self.shown.len() == FPS_WINDOW {
            self.shown.pop_front();
        }
        self.shown.push_back(due);
        due
    }
}
