//! Mosaic Render System
//!
//! Render-thread side of the thumbnail pool. The game thread never touches
//! GPU resources directly; it submits [`RenderCommand`]s to a [`RenderThread`]
//! that owns a [`RenderBackend`] and applies them in submission order.

pub mod backend;
pub mod command;
pub mod gpu;
pub mod software;
pub mod thread;

pub use backend::{create_backend, RenderBackend};
pub use command::RenderCommand;
pub use gpu::WgpuBackend;
pub use software::SoftwareBackend;
pub use thread::{RenderStats, RenderThread};

pub use wgpu;

use std::fmt;
use thiserror::Error;

/// Identifies one render-target/display-texture pair on the render thread.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u32);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

/// Rendering backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// Metal (macOS, iOS)
    Metal,
    /// DirectX 12 (Windows)
    DirectX12,
    /// Vulkan (cross-platform)
    Vulkan,
    /// OpenGL (cross-platform, fallback)
    OpenGL,
    /// WebGPU (web)
    WebGpu,
    /// CPU buffers (ultimate fallback)
    Software,
}

/// Capabilities reported by a backend
#[derive(Debug, Clone)]
pub struct DeviceCapabilities {
    pub backend: BackendType,
    pub adapter_name: String,
    pub max_texture_size: u32,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no suitable GPU adapter")]
    NoAdapter,

    #[error("device request failed: {0}")]
    Device(String),

    #[error("{0} is already allocated")]
    SlotInUse(SlotId),

    #[error("{0} is not allocated")]
    UnknownSlot(SlotId),

    #[error("{slot} is {expected:?} but the image is {actual:?}")]
    SizeMismatch {
        slot: SlotId,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("{width}x{height} exceeds the maximum texture size {max}")]
    TooLarge { width: u32, height: u32, max: u32 },

    #[error("readback failed: {0}")]
    Readback(String),

    #[error("render thread is not running")]
    Disconnected,

    #[error("failed to spawn render thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error(transparent)]
    Pixels(#[from] mosaic_asset::PixelError),
}
