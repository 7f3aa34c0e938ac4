use mosaic_asset::AssetId;
use std::fmt;

/// Cache identity of a thumbnail: the asset plus the requested pixel size.
///
/// The same asset at two sizes is two distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThumbnailKey {
    asset: AssetId,
    width: u32,
    height: u32,
}

impl ThumbnailKey {
    pub fn new(asset: impl Into<AssetId>, width: u32, height: u32) -> Self {
        Self {
            asset: asset.into(),
            width,
            height,
        }
    }

    /// Square thumbnail, the common case for asset tiles.
    pub fn square(asset: impl Into<AssetId>, edge: u32) -> Self {
        Self::new(asset, edge, edge)
    }

    #[inline]
    pub fn asset(&self) -> &AssetId {
        &self.asset
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl fmt::Display for ThumbnailKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}x{}", self.asset, self.width, self.height)
    }
}
