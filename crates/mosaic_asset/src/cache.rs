//! Serialized thumbnail cache
//!
//! Holds the packaged image of an asset's thumbnail, keyed by the asset's full
//! name. It is separate from the live GPU slots in the pool: the pool falls back
//! to it when no live renderer is available, and marks entries dirty when the
//! asset changes so the next save regenerates them.

use crate::pixels::{PixelError, ThumbnailImage};
use dashmap::DashMap;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("thumbnail cache io: {0}")]
    Io(#[from] io::Error),

    #[error("thumbnail cache index: {0}")]
    Index(#[from] serde_json::Error),

    #[error(transparent)]
    Pixels(#[from] PixelError),
}

/// Serialized thumbnail of one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectThumbnail {
    image: ThumbnailImage,
    dirty: bool,
}

impl ObjectThumbnail {
    pub fn new(image: ThumbnailImage) -> Self {
        Self {
            image,
            dirty: false,
        }
    }

    pub fn image(&self) -> &ThumbnailImage {
        &self.image
    }

    pub fn into_image(self) -> ThumbnailImage {
        self.image
    }

    /// Dirty thumbnails are still usable but must be regenerated on the next save.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn to_png(&self) -> Result<Vec<u8>, PixelError> {
        self.image.encode_png()
    }

    pub fn from_png(bytes: &[u8]) -> Result<Self, PixelError> {
        Ok(Self::new(ThumbnailImage::decode_png(bytes)?))
    }
}

pub trait ThumbnailCache: Send + Sync {
    fn find(&self, full_name: &str) -> Option<ObjectThumbnail>;

    fn store(&self, full_name: &str, thumbnail: ObjectThumbnail) -> Result<(), CacheError>;

    /// Returns `false` when nothing is cached under `full_name`.
    fn mark_dirty(&self, full_name: &str) -> bool;

    fn dirty_names(&self) -> Vec<String>;
}

/// Cache that lives only as long as the process.
pub struct MemoryThumbnailCache {
    thumbnails: DashMap<String, ObjectThumbnail>,
}

impl MemoryThumbnailCache {
    pub fn new() -> Self {
        Self {
            thumbnails: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.thumbnails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thumbnails.is_empty()
    }
}

impl Default for MemoryThumbnailCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ThumbnailCache for MemoryThumbnailCache {
    fn find(&self, full_name: &str) -> Option<ObjectThumbnail> {
        self.thumbnails.get(full_name).map(|entry| entry.value().clone())
    }

    fn store(&self, full_name: &str, thumbnail: ObjectThumbnail) -> Result<(), CacheError> {
        self.thumbnails.insert(full_name.to_string(), thumbnail);
        Ok(())
    }

    fn mark_dirty(&self, full_name: &str) -> bool {
        match self.thumbnails.get_mut(full_name) {
            Some(mut entry) => {
                entry.mark_dirty();
                true
            }
            None => false,
        }
    }

    fn dirty_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .thumbnails
            .iter()
            .filter(|entry| entry.is_dirty())
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }
}
