//! Mosaic Asset Layer
//!
//! Asset identity, thumbnail pixel data, the renderer capability that assets
//! implement, and the serialized thumbnail cache that backs thumbnails when no
//! live renderer is available.

pub mod cache;
pub mod disk_cache;
pub mod pixels;
pub mod registry;
pub mod renderer;

pub use cache::{CacheError, MemoryThumbnailCache, ObjectThumbnail, ThumbnailCache};
pub use disk_cache::DiskThumbnailCache;
pub use pixels::{PixelError, ThumbnailImage};
pub use registry::{AssetRegistry, AssetSource};
pub use renderer::{RenderThumbnailError, ThumbnailRenderer};

use std::fmt;
use std::sync::Arc;

/// Stable identity of a previewable asset (its full object path).
///
/// Cheap to clone; two ids compare equal when their full names match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(Arc<str>);

impl AssetId {
    pub fn new(full_name: impl AsRef<str>) -> Self {
        Self(Arc::from(full_name.as_ref()))
    }

    /// Full name used as the key of the serialized thumbnail cache.
    pub fn full_name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AssetId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}
