pub mod config;
pub mod control;
pub mod error;
pub mod framework;
pub mod io;
pub mod prelude;
pub mod render;
pub mod runtime;
pub mod settings;

pub use error::DisplayError;
pub use runtime::playback::{Player, PlaybackPhase};
