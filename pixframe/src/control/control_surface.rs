use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use log::{debug, error, info, trace, warn};

use crate::error::DisplayError;
use crate::runtime::display_state::DisplayState;
use crate::runtime::events::{PlayerEvent, PlayerEventReceiver};
use crate::settings::Mutation;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Status {
    pub powered: bool,
    pub brightness_percent: u8,
    pub source_id: String,
    pub generation: u64,
}

/// Command entry point shared by every control transport.
///
/// Each call is a single read or mutation of [`DisplayState`] and never
/// waits on the playback thread.
#[derive(Clone)]
pub struct ControlSurface {
    state: Arc<DisplayState>,
    last_error: Arc<Mutex<Option<DisplayError>>>,
}

impl ControlSurface {
    pub fn new(state: Arc<DisplayState>) -> Self {
        Self {
            state,
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn power_on(&self) -> Result<(), DisplayError> {
        self.apply(Mutation::SetPower(true))
    }

    pub fn power_off(&self) -> Result<(), DisplayError> {
        self.apply(Mutation::SetPower(false))
    }

    pub fn set_brightness(&self, percent: i32) -> Result<(), DisplayError> {
        self.apply(Mutation::SetBrightness(percent))
    }

    pub fn set_source(&self, source_id: &str) -> Result<(), DisplayError> {
        self.apply(Mutation::SetSource(source_id.to_string()))
    }

    pub fn brightness(&self) -> u8 {
        self.state.snapshot().settings.brightness_percent
    }

    pub fn power_state(&self) -> bool {
        self.state.snapshot().settings.powered
    }

    pub fn source(&self) -> String {
        self.state.snapshot().settings.source_id.clone()
    }

    pub fn ping(&self) -> &'static str {
        "pong"
    }

    pub fn status(&self) -> Status {
        let snapshot = self.state.snapshot();
        Status {
            powered: snapshot.settings.powered,
            brightness_percent: snapshot.settings.brightness_percent,
            source_id: snapshot.settings.source_id.clone(),
            generation: snapshot.generation,
        }
    }

    /// Most recent decode/build/hardware failure reported by playback.
    pub fn last_error(&self) -> Option<DisplayError> {
        self.errors().clone()
    }

    /// Drains player events on a background thread until the player stops.
    pub fn observe(
        &self,
        events: PlayerEventReceiver,
    ) -> Result<thread::JoinHandle<()>, DisplayError> {
        let surface = self.clone();
        thread::Builder::new()
            .name("pixframe-events".to_string())
            .spawn(move || {
                for event in events {
                    surface.record(event);
                }
                trace!("Player event stream closed");
            })
            .map_err(|err| {
                DisplayError::Config(format!(
                    "failed to start event observer: {}",
                    err
                ))
            })
    }

    fn record(&self, event: PlayerEvent) {
        match event {
            PlayerEvent::Failed(err) => {
                if err.is_recoverable() {
                    warn!("Playback reported: {}", err);
                } else {
                    error!("Playback reported: {}", err);
                }
                *self.errors() = Some(err);
            }
            PlayerEvent::SourceLoaded {
                source_id,
                frame_count,
            } => {
                debug!("'{}' ready with {} frames", source_id, frame_count);
                *self.errors() = None;
            }
            PlayerEvent::CanvasReopened { attempt } => {
                info!("Canvas recovered on attempt {}", attempt);
            }
            PlayerEvent::Stopped => info!("Player stopped"),
            other => trace!("{:?}", other),
        }
    }

    fn apply(&self, mutation: Mutation) -> Result<(), DisplayError> {
        self.state.apply(mutation).map(|_| ()).inspect_err(|err| {
            warn!("Rejected command: {}", err);
        })
    }

    fn errors(&self) -> MutexGuard<'_, Option<DisplayError>> {
        self.last_error.lock().unwrap_or_else(|e| e.into_inner())
    }
}
