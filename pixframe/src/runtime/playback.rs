use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use super::display_state::{DisplayState, StateSnapshot};
use super::events::{
    PlayerEvent, PlayerEventReceiver, PlayerEventSender, event_channel,
};
use super::frame_clock::FrameClock;
use crate::config::PlaybackConfig;
use crate::error::DisplayError;
use crate::io::decoder::{RawSource, SourceDecoder};
use crate::io::source_watch::SourceWatch;
use crate::render::canvas::{Canvas, CanvasFactory};
use crate::render::frames::{FrameSequence, build_frames};

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PlaybackPhase {
    /// No frames have been built yet.
    Loading,
    /// Powered off with the canvas cleared.
    Idle,
    Playing,
    /// Decoding a source or rebuilding frames for new settings.
    Rebuilding,
    Stopped,
}

pub struct PlaybackLoop<D: SourceDecoder> {
    state: Arc<DisplayState>,
    decoder: D,
    canvas_factory: CanvasFactory,
    config: PlaybackConfig,
    watch: Option<SourceWatch>,
    shutdown: Arc<AtomicBool>,
    events: Option<PlayerEventSender>,
    phase: PlaybackPhase,
    raw: Option<RawSource>,
    raw_revision: u64,
    // (source id, generation) of the last decode attempt.
    decode_attempt: Option<(String, u64)>,
    // (generation, raw revision) of the last build attempt.
    build_attempt: Option<(u64, u64)>,
    sequence: Option<FrameSequence>,
    cursor: usize,
    cleared: bool,
}

impl<D: SourceDecoder> PlaybackLoop<D> {
    pub fn new(
        state: Arc<DisplayState>,
        decoder: D,
        canvas_factory: CanvasFactory,
        config: PlaybackConfig,
    ) -> Self {
        Self {
            state,
            decoder,
            canvas_factory,
            config,
            watch: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            events: None,
            phase: PlaybackPhase::Loading,
            raw: None,
            raw_revision: 0,
            decode_attempt: None,
            build_attempt: None,
            sequence: None,
            cursor: 0,
            cleared: false,
        }
    }

    pub fn with_watch(mut self, watch: SourceWatch) -> Self {
        self.watch = Some(watch);
        self
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Runs until shutdown is requested or the canvas cannot be recovered.
    pub fn run(mut self) -> Result<(), DisplayError> {
        self.config.validate()?;

        let mut canvas: Option<Box<dyn Canvas>> = None;
        let mut clock = FrameClock::new(1.0);
        let mut failures = 0u32;

        let result = loop {
            if self.stop_requested() {
                break Ok(());
            }

            if canvas.is_none() {
                match (self.canvas_factory)() {
                    Ok(opened) => {
                        if failures > 0 {
                            info!(
                                "Canvas reopened after {} failures",
                                failures
                            );
                            self.emit(PlayerEvent::CanvasReopened {
                                attempt: failures,
                            });
                        }
                        clock = FrameClock::for_refresh_rate(
                            opened.refresh_rate_hz(),
                            self.config.framerate_divisor,
                        );
                        self.cleared = false;
                        canvas = Some(opened);
                    }
                    Err(err) => {
                        match self.hardware_failure(err, &mut failures) {
                            Ok(()) => continue,
                            Err(err) => break Err(err),
                        }
                    }
                }
            }

            let Some(active) = canvas.as_mut() else {
                continue;
            };

            match self.step(&mut **active, &mut clock) {
                Ok(submitted) => {
                    if submitted > 0 {
                        failures = 0;
                    }
                }
                Err(err) => {
                    canvas = None;
                    if let Err(err) = self.hardware_failure(err, &mut failures)
                    {
                        break Err(err);
                    }
                }
            }
        };

        self.finish(canvas);
        result
    }

    fn step(
        &mut self,
        canvas: &mut dyn Canvas,
        clock: &mut FrameClock,
    ) -> Result<usize, DisplayError> {
        let snapshot = self.state.snapshot();

        self.refresh_source(&snapshot);
        self.refresh_frames(&snapshot, canvas.dimensions());

        if !snapshot.settings.powered {
            self.idle(canvas, clock)?;
            return Ok(0);
        }

        let Some(sequence) = self.sequence.take() else {
            self.set_phase(PlaybackPhase::Loading);
            self.sleep_unless_stopped(self.config.idle_poll());
            return Ok(0);
        };

        let result = self.play_cycle(canvas, clock, &sequence, &snapshot);
        self.sequence = Some(sequence);
        result
    }

    fn refresh_source(&mut self, snapshot: &StateSnapshot) {
        let source_id = &snapshot.settings.source_id;
        if source_id.is_empty() {
            return;
        }

        let file_changed = self
            .watch
            .as_ref()
            .is_some_and(|watch| watch.take_changed(source_id));
        let loaded = self
            .raw
            .as_ref()
            .is_some_and(|raw| &raw.source_id == source_id);
        let attempt = (source_id.clone(), snapshot.generation);

        if !file_changed
            && (loaded || self.decode_attempt.as_ref() == Some(&attempt))
        {
            return;
        }

        self.decode_attempt = Some(attempt);
        self.set_phase(if self.sequence.is_some() {
            PlaybackPhase::Rebuilding
        } else {
            PlaybackPhase::Loading
        });

        match self.decoder.decode(source_id) {
            Ok(raw) => {
                info!("Loaded '{}' ({} frames)", source_id, raw.frames.len());
                self.emit(PlayerEvent::SourceLoaded {
                    source_id: source_id.clone(),
                    frame_count: raw.frames.len(),
                });
                self.raw = Some(raw);
                self.raw_revision += 1;
            }
            Err(err) => {
                match &self.raw {
                    Some(raw) => warn!(
                        "{}; still playing '{}'",
                        err, raw.source_id
                    ),
                    None => warn!("{}; nothing to play yet", err),
                }
                self.emit(PlayerEvent::Failed(err));
            }
        }
    }

    fn refresh_frames(
        &mut self,
        snapshot: &StateSnapshot,
        target: (u32, u32),
    ) {
        let attempt = (snapshot.generation, self.raw_revision);
        if self.raw.is_none() || self.build_attempt == Some(attempt) {
            return;
        }

        self.set_phase(PlaybackPhase::Rebuilding);
        let Some(raw) = self.raw.as_ref() else {
            return;
        };

        match build_frames(raw, &snapshot.settings, snapshot.generation, target)
        {
            Ok(sequence) => {
                // Settings moved on mid-build: these frames are already stale.
                if self.state.generation() != snapshot.generation {
                    debug!(
                        "Discarding frames for generation {}",
                        snapshot.generation
                    );
                    self.emit(PlayerEvent::BuildDiscarded {
                        generation: snapshot.generation,
                    });
                    return;
                }

                info!(
                    "Built {} frames of '{}' at {}% (generation {})",
                    sequence.len(),
                    sequence.source_id,
                    snapshot.settings.brightness_percent,
                    sequence.generation
                );
                self.emit(PlayerEvent::FramesRebuilt {
                    generation: sequence.generation,
                    frame_count: sequence.len(),
                });
                self.build_attempt = Some(attempt);
                self.sequence = Some(sequence);
                self.cursor = 0;
            }
            Err(err) => {
                warn!("{}; keeping previous frames", err);
                self.build_attempt = Some(attempt);
                self.emit(PlayerEvent::Failed(err));
            }
        }
    }

    fn idle(
        &mut self,
        canvas: &mut dyn Canvas,
        clock: &mut FrameClock,
    ) -> Result<(), DisplayError> {
        if !self.cleared {
            canvas.clear()?;
            self.cleared = true;
        }
        clock.reset();
        self.set_phase(PlaybackPhase::Idle);
        self.sleep_unless_stopped(self.config.idle_poll());
        Ok(())
    }

    /// Shows at most one full pass of `sequence`, stopping early when the
    /// settings change.
    fn play_cycle(
        &mut self,
        canvas: &mut dyn Canvas,
        clock: &mut FrameClock,
        sequence: &FrameSequence,
        snapshot: &StateSnapshot,
    ) -> Result<usize, DisplayError> {
        self.set_phase(PlaybackPhase::Playing);

        let check_every = self.config.check_every_frames.max(1) as usize;
        let mut submitted = 0usize;

        for _ in 0..sequence.len() {
            if self.stop_requested() {
                break;
            }

            clock.wait_for_next_frame();
            canvas.submit_frame(&sequence.frames[self.cursor])?;
            self.cleared = false;
            submitted += 1;
            self.cursor = (self.cursor + 1) % sequence.len();

            if self.cursor == 0 {
                debug!("Cycle complete at {:.1} fps", clock.average_fps());
            }

            if submitted % check_every == 0 && self.settings_changed(snapshot)
            {
                break;
            }
        }

        Ok(submitted)
    }

    fn settings_changed(&self, seen: &StateSnapshot) -> bool {
        let current = self.state.snapshot();
        current.generation != seen.generation || !current.settings.powered
    }

    fn hardware_failure(
        &mut self,
        err: DisplayError,
        failures: &mut u32,
    ) -> Result<(), DisplayError> {
        *failures += 1;
        error!("Canvas failure {}: {}", failures, err);
        self.emit(PlayerEvent::Failed(err.clone()));

        if *failures > self.config.max_canvas_reinit {
            error!(
                "Giving up after {} canvas re-initializations",
                self.config.max_canvas_reinit
            );
            return Err(err);
        }

        warn!(
            "Reopening canvas (attempt {}/{})",
            failures, self.config.max_canvas_reinit
        );
        self.sleep_unless_stopped(self.config.reinit_backoff());
        Ok(())
    }

    fn finish(&mut self, canvas: Option<Box<dyn Canvas>>) {
        if let Some(mut canvas) = canvas {
            if self.state.get().powered && !self.cleared {
                if let Err(err) = canvas.clear() {
                    warn!("Failed to clear canvas on shutdown: {}", err);
                }
            }
        }

        self.set_phase(PlaybackPhase::Stopped);
        self.emit(PlayerEvent::Stopped);
        info!("Playback stopped");
    }

    fn set_phase(&mut self, phase: PlaybackPhase) {
        if self.phase != phase {
            debug!("Playback {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
            self.emit(PlayerEvent::PhaseChanged(phase));
        }
    }

    fn emit(&self, event: PlayerEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    fn stop_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn sleep_unless_stopped(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            if self.stop_requested() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep((deadline - now).min(STOP_POLL_INTERVAL));
        }
    }
}

/// Handle to a playback loop running on its own thread.
pub struct Player {
    handle: Option<thread::JoinHandle<Result<(), DisplayError>>>,
    shutdown: Arc<AtomicBool>,
    events: Option<PlayerEventReceiver>,
}

impl Player {
    pub fn spawn<D: SourceDecoder>(
        mut playback: PlaybackLoop<D>,
    ) -> Result<Self, DisplayError> {
        let (event_tx, event_rx) = event_channel();
        playback.events = Some(event_tx);
        let shutdown = playback.shutdown_flag();

        let handle = thread::Builder::new()
            .name("pixframe-playback".to_string())
            .spawn(move || playback.run())
            .map_err(|err| {
                DisplayError::Hardware(format!(
                    "failed to start playback thread: {}",
                    err
                ))
            })?;

        Ok(Self {
            handle: Some(handle),
            shutdown,
            events: Some(event_rx),
        })
    }

    /// Hands the event stream to a single consumer.
    pub fn events(&mut self) -> Option<PlayerEventReceiver> {
        self.events.take()
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Stops playback and returns how the loop ended.
    pub fn shutdown(mut self) -> Result<(), DisplayError> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Result<(), DisplayError> {
        self.request_shutdown();
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                Err(DisplayError::Hardware(
                    "playback thread panicked".to_string(),
                ))
            }),
            None => Ok(()),
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if let Err(err) = self.stop_and_join() {
            error!("Playback ended with error: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use image::{Rgba, RgbaImage};

    use super::*;
    use crate::io::decoder::MemorySourceDecoder;
    use crate::render::canvas::{CanvasCall, CanvasLog, MemoryCanvas};
    use crate::settings::{DisplaySettings, Mutation};

    fn fast_config() -> PlaybackConfig {
        PlaybackConfig {
            framerate_divisor: 1,
            check_every_frames: 4,
            idle_poll_ms: 5,
            max_canvas_reinit: 3,
            reinit_backoff_ms: 1,
        }
    }

    fn solid(r: u8, g: u8, b: u8) -> RgbaImage {
        RgbaImage::from_pixel(2, 2, Rgba([r, g, b, 255]))
    }

    fn settings(source_id: &str, brightness_percent: u8) -> DisplaySettings {
        DisplaySettings {
            source_id: source_id.to_string(),
            powered: true,
            brightness_percent,
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    fn spawn(
        state: &Arc<DisplayState>,
        decoder: MemorySourceDecoder,
        log: &CanvasLog,
        config: PlaybackConfig,
    ) -> Player {
        let playback = PlaybackLoop::new(
            state.clone(),
            decoder,
            MemoryCanvas::factory(2, 2, 10_000.0, log.clone()),
            config,
        );
        Player::spawn(playback).expect("spawn player")
    }

    fn red_channel(frame: &image::RgbImage) -> u8 {
        frame.get_pixel(0, 0).0[0]
    }

    #[test]
    fn cycles_frames_in_order_at_half_brightness() {
        let decoder = MemorySourceDecoder::new();
        decoder.insert(
            "abc.gif",
            vec![solid(200, 0, 0), solid(0, 200, 0), solid(0, 0, 200)],
        );
        let state = Arc::new(DisplayState::new(settings("abc.gif", 50)));
        let log = CanvasLog::new();
        let player = spawn(&state, decoder, &log, fast_config());

        assert!(wait_until(|| log.submitted().len() >= 6));
        player.shutdown().expect("clean shutdown");

        let colors: Vec<[u8; 3]> = log.submitted()[..6]
            .iter()
            .map(|frame| frame.get_pixel(0, 0).0)
            .collect();
        assert_eq!(
            colors,
            vec![
                [100, 0, 0],
                [0, 100, 0],
                [0, 0, 100],
                [100, 0, 0],
                [0, 100, 0],
                [0, 0, 100],
            ]
        );
    }

    #[test]
    fn power_off_clears_and_stops_submitting() {
        let decoder = MemorySourceDecoder::new();
        decoder.insert("a.gif", vec![solid(255, 0, 0)]);
        let state = Arc::new(DisplayState::new(settings("a.gif", 100)));
        let log = CanvasLog::new();
        let player = spawn(&state, decoder, &log, fast_config());

        assert!(wait_until(|| !log.submitted().is_empty()));
        state.apply(Mutation::SetPower(false)).unwrap();
        assert!(wait_until(|| log.clear_count() == 1));

        let submitted = log.submitted().len();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(log.submitted().len(), submitted);
        assert_eq!(log.calls().last(), Some(&CanvasCall::Clear));

        state.apply(Mutation::SetPower(true)).unwrap();
        assert!(wait_until(|| log.submitted().len() > submitted));
        player.shutdown().expect("clean shutdown");
    }

    #[test]
    fn brightness_change_rebuilds_frames() {
        let decoder = MemorySourceDecoder::new();
        decoder.insert("a.gif", vec![solid(200, 0, 0)]);
        let state = Arc::new(DisplayState::new(settings("a.gif", 100)));
        let log = CanvasLog::new();
        let player = spawn(&state, decoder, &log, fast_config());

        assert!(wait_until(|| !log.submitted().is_empty()));
        state.apply(Mutation::SetBrightness(25)).unwrap();
        assert!(wait_until(|| {
            log.submitted().last().map(red_channel) == Some(50)
        }));
        player.shutdown().expect("clean shutdown");
    }

    #[test]
    fn long_animation_sees_changes_mid_cycle() {
        let decoder = MemorySourceDecoder::new();
        decoder.insert("long.gif", vec![solid(200, 0, 0); 400]);
        let state = Arc::new(DisplayState::new(settings("long.gif", 100)));
        let log = CanvasLog::new();
        let config = fast_config();
        let check_every = config.check_every_frames as usize;
        let player = spawn(&state, decoder, &log, config);

        assert!(wait_until(|| log.submitted().len() >= 8));
        state.apply(Mutation::SetBrightness(50)).unwrap();
        let applied_at = log.submitted().len();

        assert!(wait_until(|| {
            log.submitted().iter().any(|frame| red_channel(frame) == 100)
        }));
        player.shutdown().expect("clean shutdown");

        let frames = log.submitted();
        let first_dimmed = frames
            .iter()
            .position(|frame| red_channel(frame) == 100)
            .expect("dimmed frame");
        assert!(first_dimmed.saturating_sub(applied_at) <= check_every);
    }

    /// Changes brightness while the first decode is still running.
    struct RacingDecoder {
        inner: MemorySourceDecoder,
        state: Arc<DisplayState>,
        raced: AtomicBool,
    }

    impl SourceDecoder for RacingDecoder {
        fn decode(&self, source_id: &str) -> Result<RawSource, DisplayError> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                self.state.apply(Mutation::SetBrightness(50))?;
            }
            self.inner.decode(source_id)
        }
    }

    #[test]
    fn overtaken_build_is_discarded_and_retried() {
        let inner = MemorySourceDecoder::new();
        inner.insert("a.gif", vec![solid(200, 0, 0)]);
        let state = Arc::new(DisplayState::new(settings("a.gif", 100)));
        let decoder = RacingDecoder {
            inner,
            state: state.clone(),
            raced: AtomicBool::new(false),
        };
        let log = CanvasLog::new();
        let playback = PlaybackLoop::new(
            state.clone(),
            decoder,
            MemoryCanvas::factory(2, 2, 10_000.0, log.clone()),
            fast_config(),
        );
        let mut player = Player::spawn(playback).expect("spawn player");
        let events = player.events().expect("event stream");

        assert!(wait_until(|| !log.submitted().is_empty()));
        player.shutdown().expect("clean shutdown");

        let events: Vec<PlayerEvent> = events.try_iter().collect();
        let discarded = events
            .iter()
            .position(|e| *e == PlayerEvent::BuildDiscarded { generation: 0 })
            .expect("stale build discarded");
        let rebuilt = events
            .iter()
            .position(|e| {
                matches!(e, PlayerEvent::FramesRebuilt { generation: 1, .. })
            })
            .expect("frames rebuilt for the new generation");
        assert!(discarded < rebuilt);
        assert!(!events.iter().any(|e| {
            matches!(e, PlayerEvent::FramesRebuilt { generation: 0, .. })
        }));
        assert_eq!(log.submitted()[0].get_pixel(0, 0).0, [100, 0, 0]);
    }

    #[test]
    fn switching_source_does_not_blank_the_canvas() {
        let decoder = MemorySourceDecoder::new();
        decoder.insert("a.gif", vec![solid(200, 0, 0)]);
        decoder.insert("b.gif", vec![solid(0, 200, 0)]);
        let state = Arc::new(DisplayState::new(settings("a.gif", 100)));
        let log = CanvasLog::new();
        let player = spawn(&state, decoder, &log, fast_config());

        assert!(wait_until(|| !log.submitted().is_empty()));
        state.apply(Mutation::SetSource("b.gif".to_string())).unwrap();
        assert!(wait_until(|| {
            log.submitted().last().map(|f| f.get_pixel(0, 0).0)
                == Some([0, 200, 0])
        }));

        assert_eq!(log.clear_count(), 0);
        player.shutdown().expect("clean shutdown");
    }

    #[test]
    fn decode_failure_keeps_previous_frames() {
        let decoder = MemorySourceDecoder::new();
        decoder.insert("a.gif", vec![solid(200, 0, 0)]);
        let state = Arc::new(DisplayState::new(settings("a.gif", 100)));
        let log = CanvasLog::new();
        let mut player = spawn(&state, decoder, &log, fast_config());
        let events = player.events().expect("event stream");

        assert!(wait_until(|| !log.submitted().is_empty()));
        state
            .apply(Mutation::SetSource("missing.gif".to_string()))
            .unwrap();

        let failure = events
            .iter()
            .find(|event| matches!(event, PlayerEvent::Failed(_)));
        match failure {
            Some(PlayerEvent::Failed(DisplayError::Decode {
                source_id, ..
            })) => assert_eq!(source_id, "missing.gif"),
            other => panic!("unexpected event: {:?}", other),
        }

        let before = log.submitted().len();
        assert!(wait_until(|| log.submitted().len() > before + 4));
        assert!(player.is_running());
        assert!(log.submitted().iter().all(|f| red_channel(f) == 200));
        player.shutdown().expect("clean shutdown");
    }

    #[test]
    fn reopens_canvas_after_submit_failures() {
        let decoder = MemorySourceDecoder::new();
        decoder.insert("a.gif", vec![solid(10, 0, 0)]);
        let state = Arc::new(DisplayState::new(settings("a.gif", 100)));
        let log = CanvasLog::new();
        log.fail_submits(2);
        let mut player = spawn(&state, decoder, &log, fast_config());
        let events = player.events().expect("event stream");

        assert!(wait_until(|| !log.submitted().is_empty()));
        assert_eq!(log.opens(), 3);
        player.shutdown().expect("recovered canvas");

        let reopened: Vec<u32> = events
            .try_iter()
            .filter_map(|event| match event {
                PlayerEvent::CanvasReopened { attempt } => Some(attempt),
                _ => None,
            })
            .collect();
        assert_eq!(reopened, vec![1, 2]);
    }

    #[test]
    fn escalates_when_canvas_never_recovers() {
        let decoder = MemorySourceDecoder::new();
        decoder.insert("a.gif", vec![solid(10, 0, 0)]);
        let state = Arc::new(DisplayState::new(settings("a.gif", 100)));
        let log = CanvasLog::new();
        log.fail_submits(u32::MAX);
        let config = PlaybackConfig {
            max_canvas_reinit: 2,
            ..fast_config()
        };
        let player = spawn(&state, decoder, &log, config);

        assert!(wait_until(|| !player.is_running()));
        let err = player.shutdown().unwrap_err();
        assert!(matches!(err, DisplayError::Hardware(_)));
        assert_eq!(log.opens(), 3);
    }

    #[test]
    fn shutdown_clears_a_powered_canvas() {
        let decoder = MemorySourceDecoder::new();
        decoder.insert("a.gif", vec![solid(10, 0, 0)]);
        let state = Arc::new(DisplayState::new(settings("a.gif", 100)));
        let log = CanvasLog::new();
        let mut player = spawn(&state, decoder, &log, fast_config());
        let events = player.events().expect("event stream");

        assert!(wait_until(|| !log.submitted().is_empty()));
        player.shutdown().expect("clean shutdown");

        assert_eq!(log.calls().last(), Some(&CanvasCall::Clear));
        let tail: Vec<PlayerEvent> = events.try_iter().collect();
        assert_eq!(tail.last(), Some(&PlayerEvent::Stopped));
        assert!(tail.contains(&PlayerEvent::PhaseChanged(
            PlaybackPhase::Stopped
        )));
    }
}
