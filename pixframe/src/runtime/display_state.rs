use std::sync::Arc;

use log::{debug, info};
use parking_lot::RwLock;

use super::storage::Persister;
use crate::error::DisplayError;
use crate::settings::{DisplaySettings, Mutation};

/// A settings value together with the generation it belongs to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StateSnapshot {
    pub settings: DisplaySettings,
    pub generation: u64,
}

/// Single source of truth shared by the control surface and playback loop.
///
/// Readers take a cheap `Arc` clone of the current snapshot; writers build a
/// new snapshot and swap it in under the write lock, so no reader ever sees
/// a half-applied mutation.
pub struct DisplayState {
    current: RwLock<Arc<StateSnapshot>>,
    persister: Option<Persister>,
}

impl DisplayState {
    pub fn new(settings: DisplaySettings) -> Self {
        Self {
            current: RwLock::new(Arc::new(StateSnapshot {
                settings,
                generation: 0,
            })),
            persister: None,
        }
    }

    pub fn with_persister(
        settings: DisplaySettings,
        persister: Persister,
    ) -> Self {
        Self {
            persister: Some(persister),
            ..Self::new(settings)
        }
    }

    pub fn snapshot(&self) -> Arc<StateSnapshot> {
        self.current.read().clone()
    }

    pub fn get(&self) -> DisplaySettings {
        self.snapshot().settings.clone()
    }

    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }

    pub fn apply(
        &self,
        mutation: Mutation,
    ) -> Result<DisplaySettings, DisplayError> {
        let mut current = self.current.write();
        let settings = current.settings.with(&mutation)?;
        let generation = if mutation.invalidates_frames() {
            current.generation + 1
        } else {
            current.generation
        };

        // Enqueued under the lock so writes reach storage in apply order.
        if let Some(persister) = &self.persister {
            persister.enqueue(settings.clone());
        }

        *current = Arc::new(StateSnapshot {
            settings: settings.clone(),
            generation,
        });
        drop(current);

        debug!("Applied {:?} (generation {})", mutation, generation);
        info!(
            "Display is now {} with brightness={}% source='{}'",
            if settings.powered { "ON" } else { "OFF" },
            settings.brightness_percent,
            settings.source_id
        );

        Ok(settings)
    }

    /// Blocks until every accepted mutation has been written to storage.
    pub fn flush(&self) {
        if let Some(persister) = &self.persister {
            persister.flush();
        }
    }
}
