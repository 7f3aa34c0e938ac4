//! Bounded pool of thumbnail render slots
//!
//! UI tiles reference thumbnails by [`ThumbnailKey`]. The pool binds each key
//! to one of at most `pool_capacity` GPU slots, renders it on a time budget
//! and recycles the least recently accessed unreferenced slot when full.

mod entry;
mod key;
#[allow(clippy::module_inception)]
mod pool;
mod queue;
mod refs;
mod slot;

pub use entry::RenderState;
pub use key::ThumbnailKey;
pub use pool::ThumbnailPool;
pub use queue::RenderQueue;
pub use refs::ReferenceTracker;
pub use slot::ThumbnailRenderSlot;

use mosaic_asset::{AssetId, CacheError, RenderThumbnailError};
use mosaic_render::{RenderError, RenderStats, SlotId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    /// Every slot is bound to a referenced key. Retry on a later tick.
    #[error("all {capacity} thumbnail slots are referenced")]
    Exhausted { capacity: usize },

    #[error("invalid thumbnail size {width}x{height} (max {max})")]
    InvalidDimensions { width: u32, height: u32, max: u32 },

    #[error("no thumbnail entry for {0}")]
    UnknownKey(ThumbnailKey),

    #[error("{key} still has {count} referencer(s)")]
    StillReferenced { key: ThumbnailKey, count: u32 },

    #[error("slots still referenced after shutdown flush: {slots:?}")]
    LeakedSlots { slots: Vec<SlotId> },

    #[error("asset {0} is not loaded")]
    NotLoaded(AssetId),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    RenderThumbnail(#[from] RenderThumbnailError),
}

impl PoolError {
    /// Errors that clear up on their own once UI holders let go.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PoolError::Exhausted { .. })
    }
}

/// Notifications for UI widgets, keyed by asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailEvent {
    Rendered(AssetId),
    RenderFailed(AssetId),
}

/// What one [`ThumbnailPool::tick`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Throttled; nothing was touched.
    pub skipped: bool,
    pub rendered: usize,
    pub realtime_rendered: usize,
    /// Uploads that came from the serialized cache rather than a live render.
    pub from_cache: usize,
    pub failed: usize,
    /// Waiting entries that received a slot this tick.
    pub pending_bound: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub entries: usize,
    pub resident: usize,
    pub allocated_slots: usize,
    pub free_slots: usize,
    pub referenced_keys: usize,
    pub one_shot_queued: usize,
    pub realtime_queued: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub released_slots: usize,
    pub render: RenderStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_exhaustion_is_retryable() {
        assert!(PoolError::Exhausted { capacity: 2 }.is_retryable());
        assert!(!PoolError::UnknownKey(ThumbnailKey::square("/Game/A.A", 64)).is_retryable());
        assert!(!PoolError::LeakedSlots { slots: vec![SlotId(1)] }.is_retryable());
        assert!(!PoolError::Render(RenderError::Disconnected).is_retryable());
    }

    #[test]
    fn leak_message_lists_slots() {
        let err = PoolError::LeakedSlots {
            slots: vec![SlotId(0), SlotId(3)],
        };
        assert_eq!(
            err.to_string(),
            "slots still referenced after shutdown flush: [SlotId(0), SlotId(3)]"
        );
    }
}
