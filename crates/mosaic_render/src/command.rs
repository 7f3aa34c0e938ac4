//! Commands sent from the game thread to the render thread

use crate::{RenderError, SlotId};
use mosaic_asset::ThumbnailImage;
use std::sync::mpsc::Sender;

/// Commands for one slot execute in submission order.
pub enum RenderCommand {
    /// Create the render target and display texture for a new slot.
    Allocate {
        slot: SlotId,
        width: u32,
        height: u32,
    },
    /// Recreate both textures of an existing slot at a new size.
    Resize {
        slot: SlotId,
        width: u32,
        height: u32,
    },
    /// Draw `image` into the render target and copy it to the display texture.
    Update { slot: SlotId, image: ThumbnailImage },
    /// Destroy both textures of a slot.
    Release { slot: SlotId },
    /// Read the display texture back to the host.
    ReadBack {
        slot: SlotId,
        reply: Sender<Result<ThumbnailImage, RenderError>>,
    },
    /// Acknowledged once every earlier command has executed.
    Flush { ack: Sender<()> },
    /// Stop the render thread after everything before it has executed.
    Shutdown,
}

impl RenderCommand {
    pub fn label(&self) -> &'static str {
        match self {
            RenderCommand::Allocate { .. } => "allocate",
            RenderCommand::Resize { .. } => "resize",
            RenderCommand::Update { .. } => "update",
            RenderCommand::Release { .. } => "release",
            RenderCommand::ReadBack { .. } => "readback",
            RenderCommand::Flush { .. } => "flush",
            RenderCommand::Shutdown => "shutdown",
        }
    }

    pub fn slot(&self) -> Option<SlotId> {
        match self {
            RenderCommand::Allocate { slot, .. }
            | RenderCommand::Resize { slot, .. }
            | RenderCommand::Update { slot, .. }
            | RenderCommand::Release { slot }
            | RenderCommand::ReadBack { slot, .. } => Some(*slot),
            RenderCommand::Flush { .. } | RenderCommand::Shutdown => None,
        }
    }
}
