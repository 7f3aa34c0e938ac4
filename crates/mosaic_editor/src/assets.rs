//! Procedural assets standing in for a loaded content browser

use mosaic_asset::{AssetId, AssetRegistry, RenderThumbnailError, ThumbnailImage, ThumbnailRenderer};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Flat colour, e.g. a material swatch.
pub struct Swatch {
    pub color: [u8; 4],
}

impl ThumbnailRenderer for Swatch {
    fn render_thumbnail(
        &self,
        width: u32,
        height: u32,
    ) -> Result<ThumbnailImage, RenderThumbnailError> {
        Ok(ThumbnailImage::filled(width, height, self.color)?)
    }
}

/// Two-colour checkerboard, e.g. a texture preview.
pub struct Checker {
    pub light: [u8; 4],
    pub dark: [u8; 4],
    pub cell: u32,
}

impl ThumbnailRenderer for Checker {
    fn render_thumbnail(
        &self,
        width: u32,
        height: u32,
    ) -> Result<ThumbnailImage, RenderThumbnailError> {
        let cell = self.cell.max(1);
        Ok(ThumbnailImage::from_fn(width, height, |x, y| {
            if (x / cell + y / cell) % 2 == 0 {
                self.light
            } else {
                self.dark
            }
        })?)
    }
}

/// Animated gradient that changes every time it is drawn, e.g. a particle
/// system. Re-rendered in real time.
#[derive(Default)]
pub struct Pulse {
    frame: AtomicU32,
}

impl ThumbnailRenderer for Pulse {
    fn supports_realtime(&self) -> bool {
        true
    }

    fn render_thumbnail(
        &self,
        width: u32,
        height: u32,
    ) -> Result<ThumbnailImage, RenderThumbnailError> {
        let frame = self.frame.fetch_add(1, Ordering::Relaxed);
        let shift = frame.wrapping_mul(8) as u8;
        Ok(ThumbnailImage::from_fn(width, height, |x, y| {
            let r = (x * 255 / width.max(1)) as u8;
            let g = (y * 255 / height.max(1)) as u8;
            [r.wrapping_add(shift), g, shift, 255]
        })?)
    }
}

/// Asset that never produces a live render, e.g. a blueprint whose preview
/// scene failed to load.
pub struct Broken;

impl ThumbnailRenderer for Broken {
    fn can_render_thumbnail(&self) -> bool {
        false
    }

    fn render_thumbnail(
        &self,
        _width: u32,
        _height: u32,
    ) -> Result<ThumbnailImage, RenderThumbnailError> {
        Err(RenderThumbnailError::Unsupported)
    }
}

/// Load `count` assets into `registry`, cycling through the kinds above.
pub fn populate(registry: &AssetRegistry, count: usize) -> Vec<AssetId> {
    (0..count)
        .map(|index| {
            let (id, renderer): (AssetId, Arc<dyn ThumbnailRenderer>) = match index % 4 {
                0 => (
                    AssetId::new(format!("/Game/Materials/M_Swatch{index}.M_Swatch{index}")),
                    Arc::new(Swatch {
                        color: [(index * 37 % 256) as u8, 96, 160, 255],
                    }),
                ),
                1 => (
                    AssetId::new(format!("/Game/Textures/T_Checker{index}.T_Checker{index}")),
                    Arc::new(Checker {
                        light: [230, 230, 230, 255],
                        dark: [40, 40, 40, 255],
                        cell: 4 + (index as u32 % 4) * 4,
                    }),
                ),
                2 => (
                    AssetId::new(format!("/Game/Effects/P_Pulse{index}.P_Pulse{index}")),
                    Arc::new(Pulse::default()),
                ),
                _ => (
                    AssetId::new(format!("/Game/Blueprints/BP_Broken{index}.BP_Broken{index}")),
                    Arc::new(Broken),
                ),
            };
            registry.load(id.clone(), renderer);
            id
        })
        .collect()
}
