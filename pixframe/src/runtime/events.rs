use std::sync::mpsc;
use std::sync::mpsc::{Receiver, Sender};

use super::playback::PlaybackPhase;
use crate::error::DisplayError;

#[derive(Clone, Debug, PartialEq)]
pub enum PlayerEvent {
    PhaseChanged(PlaybackPhase),
    SourceLoaded { source_id: String, frame_count: usize },
    FramesRebuilt { generation: u64, frame_count: usize },
    /// Settings moved on while building; the result was thrown away.
    BuildDiscarded { generation: u64 },
    CanvasReopened { attempt: u32 },
    Failed(DisplayError),
    Stopped,
}

pub type PlayerEventSender = Sender<PlayerEvent>;
pub type PlayerEventReceiver = Receiver<PlayerEvent>;

pub fn event_channel() -> (PlayerEventSender, PlayerEventReceiver) {
    mpsc::channel()
}
