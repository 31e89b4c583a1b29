use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::DisplayError;

pub const SETTINGS_VERSION: &str = "1";
pub const MAX_BRIGHTNESS: u8 = 100;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DisplaySettings {
    pub source_id: String,
    pub powered: bool,
    pub brightness_percent: u8,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            source_id: String::new(),
            powered: true,
            brightness_percent: MAX_BRIGHTNESS,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Mutation {
    SetPower(bool),
    SetBrightness(i32),
    SetSource(String),
}

impl Mutation {
    /// Power toggles reuse the cached frames; everything else rebuilds them.
    pub fn invalidates_frames(&self) -> bool {
        !matches!(self, Mutation::SetPower(_))
    }
}

impl DisplaySettings {
    /// Returns the settings with `mutation` applied, leaving `self` as is.
    pub fn with(&self, mutation: &Mutation) -> Result<Self, DisplayError> {
        let mut next = self.clone();
        match mutation {
            Mutation::SetPower(powered) => next.powered = *powered,
            Mutation::SetBrightness(percent) => {
                next.brightness_percent = checked_brightness(*percent)?;
            }
            Mutation::SetSource(id) => {
                validate_source_id(id)?;
                next.source_id = id.clone();
            }
        }
        Ok(next)
    }
}

pub fn checked_brightness(percent: i32) -> Result<u8, DisplayError> {
    if (0..=MAX_BRIGHTNESS as i32).contains(&percent) {
        Ok(percent as u8)
    } else {
        Err(DisplayError::InvalidArgument(format!(
            "brightness {} is outside 0..=100",
            percent
        )))
    }
}

/// Source ids name a file inside the sources directory and nothing else.
pub fn validate_source_id(id: &str) -> Result<(), DisplayError> {
    let reason = if id.trim().is_empty() {
        Some("source id is empty")
    } else if id.contains('/') || id.contains('\\') {
        Some("source id must not contain path separators")
    } else if id == "." || id == ".." {
        Some("source id must name a file")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(DisplayError::InvalidArgument(format!(
            "{}: '{}'",
            reason, id
        ))),
        None => Ok(()),
    }
}

/// On-disk layout. Brightness is read wider than [`DisplaySettings`] holds
/// so a hand-edited value can be clamped instead of failing the load.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct PersistedSettings {
    pub version: String,
    pub source_id: String,
    pub powered: bool,
    pub brightness_percent: i64,
}

impl Default for PersistedSettings {
    fn default() -> Self {
        Self::from(&DisplaySettings::default())
    }
}

impl From<&DisplaySettings> for PersistedSettings {
    fn from(settings: &DisplaySettings) -> Self {
        Self {
            version: SETTINGS_VERSION.to_string(),
            source_id: settings.source_id.clone(),
            powered: settings.powered,
            brightness_percent: settings.brightness_percent as i64,
        }
    }
}

impl From<PersistedSettings> for DisplaySettings {
    fn from(persisted: PersistedSettings) -> Self {
        let stored = persisted.brightness_percent;
        let brightness = stored.clamp(0, MAX_BRIGHTNESS as i64);
        if brightness != stored {
            warn!(
                "Persisted brightness {} is out of range; clamping to {}",
                stored, brightness
            );
        }

        Self {
            source_id: persisted.source_id,
            powered: persisted.powered,
            brightness_percent: brightness as u8,
        }
    }
}
