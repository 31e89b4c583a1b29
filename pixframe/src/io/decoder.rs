use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, RgbaImage};
use log::{debug, error};
use parking_lot::RwLock;

use crate::error::DisplayError;
use crate::settings::validate_source_id;

/// Decoded frames of one source, exactly as stored.
#[derive(Clone, Debug, PartialEq)]
pub struct RawSource {
    pub source_id: String,
    pub frames: Vec<RgbaImage>,
}

pub trait SourceDecoder: Send + 'static {
    fn decode(&self, source_id: &str) -> Result<RawSource, DisplayError>;
}

/// Decodes GIF files stored in a single directory.
#[derive(Clone, Debug)]
pub struct GifDirectoryDecoder {
    dir: PathBuf,
}

impl GifDirectoryDecoder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, source_id: &str) -> PathBuf {
        self.dir.join(source_id)
    }
}

impl SourceDecoder for GifDirectoryDecoder {
    fn decode(&self, source_id: &str) -> Result<RawSource, DisplayError> {
        validate_source_id(source_id)
            .map_err(|err| DisplayError::decode(source_id, err.to_string()))?;

        let path = self.path_for(source_id);
        let file = File::open(&path).map_err(|err| {
            DisplayError::decode(
                source_id,
                format!("cannot open {}: {}", path.display(), err),
            )
        })?;

        let decoder = GifDecoder::new(BufReader::new(file)).map_err(|err| {
            error!("GIF decode error for {}: {}", path.display(), err);
            DisplayError::decode(source_id, "provided image is not a gif")
        })?;

        let frames = decoder
            .into_frames()
            .collect_frames()
            .map_err(|err| {
                DisplayError::decode(
                    source_id,
                    format!("frame decode failed: {}", err),
                )
            })?
            .into_iter()
            .map(|frame| frame.into_buffer())
            .collect::<Vec<_>>();

        if frames.is_empty() {
            return Err(DisplayError::decode(source_id, "gif has no frames"));
        }

        debug!("Decoded {} frames from {}", frames.len(), path.display());

        Ok(RawSource {
            source_id: source_id.to_string(),
            frames,
        })
    }
}

/// In-memory sources, useful for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemorySourceDecoder {
    sources: Arc<RwLock<HashMap<String, Vec<RgbaImage>>>>,
}

impl MemorySourceDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, source_id: &str, frames: Vec<RgbaImage>) {
        self.sources.write().insert(source_id.to_string(), frames);
    }

    pub fn remove(&self, source_id: &str) {
        self.sources.write().remove(source_id);
    }
}

impl SourceDecoder for MemorySourceDecoder {
    fn decode(&self, source_id: &str) -> Result<RawSource, DisplayError> {
        let sources = self.sources.read();
        let frames = sources
            .get(source_id)
            .ok_or_else(|| DisplayError::decode(source_id, "no such source"))?;

        Ok(RawSource {
            source_id: source_id.to_string(),
            frames: frames.clone(),
        })
    }
}
