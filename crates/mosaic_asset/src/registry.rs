//! Loaded-asset lookup

use crate::renderer::ThumbnailRenderer;
use crate::AssetId;
use dashmap::DashMap;
use std::sync::Arc;

/// Resolves an asset id to its renderer while the asset is loaded.
pub trait AssetSource: Send + Sync {
    fn find_loaded(&self, id: &AssetId) -> Option<Arc<dyn ThumbnailRenderer>>;
}

/// Registry of currently loaded assets.
///
/// Loading and unloading take `&self` so the registry can be shared between
/// the pool and whatever streams assets in and out.
pub struct AssetRegistry {
    loaded: DashMap<AssetId, Arc<dyn ThumbnailRenderer>>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self {
            loaded: DashMap::new(),
        }
    }

    /// Register `renderer` as the loaded instance of `id`, replacing any previous one.
    pub fn load(&self, id: AssetId, renderer: Arc<dyn ThumbnailRenderer>) {
        tracing::trace!(asset = %id, "asset loaded");
        self.loaded.insert(id, renderer);
    }

    pub fn unload(&self, id: &AssetId) -> bool {
        let removed = self.loaded.remove(id).is_some();
        if removed {
            tracing::trace!(asset = %id, "asset unloaded");
        }
        removed
    }

    pub fn is_loaded(&self, id: &AssetId) -> bool {
        self.loaded.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }
}

impl Default for AssetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetSource for AssetRegistry {
    fn find_loaded(&self, id: &AssetId) -> Option<Arc<dyn ThumbnailRenderer>> {
        self.loaded.get(id).map(|entry| Arc::clone(entry.value()))
    }
}
