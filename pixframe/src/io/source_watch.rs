use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::trace;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::DisplayError;

/// Flags source files that changed on disk since the last check.
pub struct SourceWatch {
    changed: Arc<Mutex<HashSet<String>>>,
    _watcher: RecommendedWatcher,
}

impl SourceWatch {
    pub fn start(dir: PathBuf) -> Result<Self, DisplayError> {
        let changed = Arc::new(Mutex::new(HashSet::new()));
        let changed_files = changed.clone();

        let mut watcher = notify::recommended_watcher(move |result| {
            let Ok(event) = result else {
                return;
            };

            let names = changed_file_names(&event);
            if names.is_empty() {
                return;
            }

            trace!("Source files changed: {:?}", names);
            changed_files
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .extend(names);
        })
        .map_err(watch_error)?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(watch_error)?;

        Ok(Self {
            changed,
            _watcher: watcher,
        })
    }

    /// True when `source_id` changed; clears every pending change.
    pub fn take_changed(&self, source_id: &str) -> bool {
        let mut changed =
            self.changed.lock().unwrap_or_else(|e| e.into_inner());
        let hit = changed.contains(source_id);
        changed.clear();
        hit
    }
}

fn watch_error(err: notify::Error) -> DisplayError {
    DisplayError::Config(format!("failed to watch sources: {}", err))
}

fn changed_file_names(event: &Event) -> Vec<String> {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return vec![];
    }

    event
        .paths
        .iter()
        .filter_map(|path| file_name(path))
        .collect()
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}
