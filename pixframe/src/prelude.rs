pub use crate::config::{AppConfig, PanelConfig, PlaybackConfig};
pub use crate::control::control_surface::{ControlSurface, Status};
pub use crate::control::osc_server::OscControlServer;
pub use crate::error::DisplayError;
pub use crate::framework::logging::{
    DEFAULT_FILTER, VERBOSE_FILTER, init_logger, init_logger_with,
};
pub use crate::framework::logging::{debug, error, info, trace, warn};
pub use crate::io::decoder::{
    GifDirectoryDecoder, MemorySourceDecoder, RawSource, SourceDecoder,
};
pub use crate::io::source_watch::SourceWatch;
pub use crate::render::canvas::{
    Canvas, CanvasCall, CanvasFactory, CanvasLog, HeadlessCanvas,
    MemoryCanvas,
};
pub use crate::render::frames::{FrameSequence, build_frames};
pub use crate::runtime::display_state::{DisplayState, StateSnapshot};
pub use crate::runtime::events::{PlayerEvent, PlayerEventReceiver};
pub use crate::runtime::playback::{PlaybackLoop, PlaybackPhase, Player};
pub use crate::runtime::storage::{
    JsonSettingsStore, MemorySettingsStore, Persister, SettingsStore,
};
pub use crate::settings::{DisplaySettings, Mutation};
