use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DisplayError;
use crate::runtime::storage;

pub const DEFAULT_OSC_PORT: u16 = 8080;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct PanelConfig {
    pub rows: u32,
    pub cols: u32,
    pub chain_length: u32,
    pub parallel: u32,
    pub gpio_slowdown: u32,
    pub hardware_mapping: String,
    pub pixel_mapper: String,
    /// Must match the rate the panel really refreshes at. Frames are paced
    /// from this value divided by the divisor, not from the panel's vsync.
    pub refresh_hz: f32,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            rows: 64,
            cols: 64,
            chain_length: 1,
            parallel: 1,
            gpio_slowdown: 2,
            hardware_mapping: "adafruit-hat".to_string(),
            pixel_mapper: "Rotate:270".to_string(),
            refresh_hz: 120.0,
        }
    }
}

impl PanelConfig {
    /// Visible size once panels are chained and stacked.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.cols * self.chain_length, self.rows * self.parallel)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Frames are shown at `refresh_hz / framerate_divisor`.
    pub framerate_divisor: u32,
    /// Upper bound on frames shown between two settings checks.
    pub check_every_frames: u32,
    pub idle_poll_ms: u64,
    pub max_canvas_reinit: u32,
    pub reinit_backoff_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            framerate_divisor: 4,
            check_every_frames: 16,
            idle_poll_ms: 100,
            max_canvas_reinit: 3,
            reinit_backoff_ms: 250,
        }
    }
}

impl PlaybackConfig {
    pub fn validate(&self) -> Result<(), DisplayError> {
        if self.framerate_divisor == 0 {
            return Err(DisplayError::Config(
                "framerate_divisor must be at least 1".to_string(),
            ));
        }
        if self.check_every_frames == 0 {
            return Err(DisplayError::Config(
                "check_every_frames must be at least 1".to_string(),
            ));
        }
        if self.idle_poll_ms == 0 {
            return Err(DisplayError::Config(
                "idle_poll_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn reinit_backoff(&self) -> Duration {
        Duration::from_millis(self.reinit_backoff_ms)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub gifs_dir: PathBuf,
    pub settings_path: Option<PathBuf>,
    pub osc_port: u16,
    pub watch_sources: bool,
    pub panel: PanelConfig,
    pub playback: PlaybackConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gifs_dir: PathBuf::from("gifs"),
            settings_path: None,
            osc_port: DEFAULT_OSC_PORT,
            watch_sources: true,
            panel: PanelConfig::default(),
            playback: PlaybackConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, DisplayError> {
        let source = fs::read_to_string(path).map_err(|err| {
            DisplayError::Config(format!(
                "failed to read config '{}': {}",
                path.display(),
                err
            ))
        })?;

        Self::from_yaml(&source).map_err(|err| {
            DisplayError::Config(format!(
                "failed to parse config '{}': {}",
                path.display(),
                err
            ))
        })
    }

    pub fn from_yaml(source: &str) -> Result<Self, DisplayError> {
        let config: AppConfig = serde_yml::from_str(source)
            .map_err(|err| DisplayError::Config(err.to_string()))?;
        config.playback.validate()?;
        Ok(config)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.settings_path
            .clone()
            .unwrap_or_else(storage::default_settings_path)
    }
}
