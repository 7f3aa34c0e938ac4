use mosaic_render::SlotId;
use std::sync::atomic::{AtomicU64, Ordering};

/// Host-side handle to one render-target/display-texture pair.
///
/// The textures themselves live on the render thread; this only names them.
/// The pool owns every slot through a single `Arc` for the slot's whole
/// life and reuses it across assets. Recycling at another size resizes the
/// handle in place, so a clone kept past its reference sees the new size.
#[derive(Debug)]
pub struct ThumbnailRenderSlot {
    id: SlotId,
    /// Width in the high half, height in the low half.
    size: AtomicU64,
}

impl ThumbnailRenderSlot {
    pub(crate) fn new(id: SlotId, width: u32, height: u32) -> Self {
        Self {
            id,
            size: AtomicU64::new(pack(width, height)),
        }
    }

    #[inline]
    pub fn id(&self) -> SlotId {
        self.id
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.size().0
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.size().1
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        let packed = self.size.load(Ordering::Acquire);
        ((packed >> 32) as u32, packed as u32)
    }

    /// Only called by the pool after submitting the matching resize command.
    pub(crate) fn set_size(&self, width: u32, height: u32) {
        self.size.store(pack(width, height), Ordering::Release);
    }
}

fn pack(width: u32, height: u32) -> u64 {
    (u64::from(width) << 32) | u64::from(height)
}
