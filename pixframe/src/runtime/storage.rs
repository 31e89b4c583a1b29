use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use directories_next::BaseDirs;
use log::{debug, error, warn};

use crate::error::DisplayError;
use crate::settings::{DisplaySettings, PersistedSettings};

pub fn config_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|base| base.config_dir().join("PixFrame"))
}

pub fn default_settings_path() -> PathBuf {
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("settings.json")
}

pub trait SettingsStore: Send + 'static {
    /// Returns defaults when nothing has been persisted yet.
    fn load(&self) -> Result<DisplaySettings, DisplayError>;
    fn persist(&self, settings: &DisplaySettings) -> Result<(), DisplayError>;
}

#[derive(Clone, Debug)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> Result<DisplaySettings, DisplayError> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(
                    "No settings at {}; using defaults",
                    self.path.display()
                );
                return Ok(DisplaySettings::default());
            }
            Err(err) => {
                return Err(DisplayError::Storage(format!(
                    "failed to read '{}': {}",
                    self.path.display(),
                    err
                )));
            }
        };

        let persisted: PersistedSettings = serde_json::from_str(&json)
            .map_err(|err| {
                DisplayError::Storage(format!(
                    "failed to parse '{}': {}",
                    self.path.display(),
                    err
                ))
            })?;

        Ok(DisplaySettings::from(persisted))
    }

    fn persist(&self, settings: &DisplaySettings) -> Result<(), DisplayError> {
        let path = self.path.as_path();
        let json =
            serde_json::to_string_pretty(&PersistedSettings::from(settings))
                .map_err(|err| write_error(path, err))?;

        if let Some(parent_dir) = path.parent() {
            fs::create_dir_all(parent_dir)
                .map_err(|err| write_error(path, err))?;
        }

        // Write then rename so a crash mid-write never truncates settings.
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(|err| write_error(path, err))?;
        fs::rename(&tmp_path, path).map_err(|err| write_error(path, err))?;
        Ok(())
    }
}

fn write_error(path: &Path, err: impl std::fmt::Display) -> DisplayError {
    DisplayError::Storage(format!(
        "failed to write '{}': {}",
        path.display(),
        err
    ))
}

#[derive(Clone, Debug, Default)]
pub struct MemorySettingsStore {
    saved: Arc<Mutex<Vec<DisplaySettings>>>,
    initial: DisplaySettings,
}

impl MemorySettingsStore {
    pub fn new(initial: DisplaySettings) -> Self {
        Self {
            saved: Arc::default(),
            initial,
        }
    }

    /// Every value persisted so far, oldest first.
    pub fn history(&self) -> Vec<DisplaySettings> {
        self.saved.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<DisplaySettings, DisplayError> {
        Ok(self.history().last().cloned().unwrap_or(self.initial.clone()))
    }

    fn persist(&self, settings: &DisplaySettings) -> Result<(), DisplayError> {
        self.saved
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(settings.clone());
        Ok(())
    }
}

enum PersistMessage {
    Save(DisplaySettings),
    Stop,
}

/// Background writer so control calls never wait on the filesystem.
pub struct Persister {
    tx: mpsc::Sender<PersistMessage>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Persister {
    pub fn spawn<S: SettingsStore>(store: S) -> Result<Self, DisplayError> {
        let (tx, rx) = mpsc::channel::<PersistMessage>();

        let handle = thread::Builder::new()
            .name("pixframe-persister".to_string())
            .spawn(move || {
                for message in rx {
                    match message {
                        PersistMessage::Save(settings) => {
                            if let Err(err) = store.persist(&settings) {
                                error!("Failed to persist settings: {}", err);
                            } else {
                                debug!("Persisted {:?}", settings);
                            }
                        }
                        PersistMessage::Stop => break,
                    }
                }
            })
            .map_err(|err| {
                DisplayError::Storage(format!(
                    "failed to start persister thread: {}",
                    err
                ))
            })?;

        Ok(Self {
            tx,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn enqueue(&self, settings: DisplaySettings) {
        if self.tx.send(PersistMessage::Save(settings)).is_err() {
            warn!("Persister already stopped; dropping settings write");
        }
    }

    /// Writes everything queued so far, then stops the writer thread.
    pub fn flush(&self) {
        let _ = self.tx.send(PersistMessage::Stop);
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Persister thread panicked");
            }
        }
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        self.flush();
    }
}
