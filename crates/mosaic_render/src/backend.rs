//! Rendering backend abstraction
//!
//! A backend owns every GPU resource of the pool and lives on the render
//! thread. Software keeps CPU buffers; wgpu allocates real textures.

use crate::gpu::WgpuBackend;
use crate::software::SoftwareBackend;
use crate::{DeviceCapabilities, RenderError, SlotId};
use mosaic_asset::ThumbnailImage;
use mosaic_services::{BackendPreference, RenderSettings};

pub trait RenderBackend: Send {
    fn capabilities(&self) -> DeviceCapabilities;

    fn allocate(&mut self, slot: SlotId, width: u32, height: u32) -> Result<(), RenderError>;

    fn resize(&mut self, slot: SlotId, width: u32, height: u32) -> Result<(), RenderError>;

    /// Write `image` into the slot's render target, then copy the target into
    /// the display texture sampled by the UI.
    fn update(&mut self, slot: SlotId, image: &ThumbnailImage) -> Result<(), RenderError>;

    fn release(&mut self, slot: SlotId) -> Result<(), RenderError>;

    fn read_display(&mut self, slot: SlotId) -> Result<ThumbnailImage, RenderError>;

    /// Number of slots whose resources are still allocated.
    fn live_slots(&self) -> usize;
}

/// Build the backend requested by `settings`.
pub fn create_backend(settings: &RenderSettings) -> Result<Box<dyn RenderBackend>, RenderError> {
    let software = || {
        Box::new(SoftwareBackend::with_max_texture_size(
            settings.software_max_texture_size,
        )) as Box<dyn RenderBackend>
    };

    match settings.backend {
        BackendPreference::Software => Ok(software()),
        BackendPreference::Gpu => Ok(Box::new(WgpuBackend::new_headless()?)),
        BackendPreference::Auto => match WgpuBackend::new_headless() {
            Ok(gpu) => Ok(Box::new(gpu)),
            Err(err) => {
                tracing::warn!("GPU backend unavailable ({err}), using software thumbnails");
                Ok(software())
            }
        },
    }
}
