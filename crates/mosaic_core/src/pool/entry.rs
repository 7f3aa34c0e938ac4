use super::{ThumbnailKey, ThumbnailRenderSlot};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of the most recent render of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    /// Bound (or waiting for a slot) but never rendered.
    Pending,
    Rendered,
    /// Neither a live renderer nor a cached image was available.
    Failed,
}

pub(crate) struct ThumbnailEntry {
    pub(crate) key: ThumbnailKey,
    /// `None` while the entry waits for capacity.
    pub(crate) slot: Option<Arc<ThumbnailRenderSlot>>,
    pub(crate) last_access: Duration,
    /// Breaks ties between equal `last_access` stamps: lower was accessed first.
    pub(crate) access_seq: u64,
    pub(crate) last_render: Option<Duration>,
    pub(crate) realtime: bool,
    pub(crate) state: RenderState,
}

impl ThumbnailEntry {
    pub(crate) fn new(key: ThumbnailKey, now: Duration, access_seq: u64) -> Self {
        Self {
            key,
            slot: None,
            last_access: now,
            access_seq,
            last_render: None,
            realtime: false,
            state: RenderState::Pending,
        }
    }

    pub(crate) fn touch(&mut self, now: Duration, access_seq: u64) {
        self.last_access = now;
        self.access_seq = access_seq;
    }

    /// Bind a (possibly recycled) slot; the entry must be rendered again.
    pub(crate) fn bind(&mut self, slot: Arc<ThumbnailRenderSlot>) {
        self.slot = Some(slot);
        self.state = RenderState::Pending;
        self.last_render = None;
        self.realtime = false;
    }

    /// Recycling order: smallest first.
    #[inline]
    pub(crate) fn lru_rank(&self) -> (Duration, u64) {
        (self.last_access, self.access_seq)
    }

    #[inline]
    pub(crate) fn is_resident(&self) -> bool {
        self.slot.is_some()
    }
}
