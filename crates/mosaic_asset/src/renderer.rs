//! Thumbnail rendering capability
//!
//! Any asset type that can preview itself implements [`ThumbnailRenderer`].
//! The pool only ever talks to this trait, never to concrete asset types.

use crate::pixels::{PixelError, ThumbnailImage};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderThumbnailError {
    #[error("asset cannot produce a live thumbnail")]
    Unsupported,

    #[error("thumbnail render failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Pixels(#[from] PixelError),
}

pub trait ThumbnailRenderer: Send + Sync {
    /// Whether a live render is currently possible.
    fn can_render_thumbnail(&self) -> bool {
        true
    }

    /// Assets whose appearance changes without notification (particle systems,
    /// animated materials) return `true` to be re-rendered on a recurring basis.
    fn supports_realtime(&self) -> bool {
        false
    }

    /// Draw the asset into a `width` x `height` RGBA8 target.
    fn render_thumbnail(&self, width: u32, height: u32)
        -> Result<ThumbnailImage, RenderThumbnailError>;
}
