//! CPU-side backend
//!
//! Mirrors the two-texture layout of the GPU backend with plain RGBA8 buffers.
//! Used headless and in tests.

use crate::backend::RenderBackend;
use crate::{BackendType, DeviceCapabilities, RenderError, SlotId};
use mosaic_asset::ThumbnailImage;
use std::collections::HashMap;

type Rgba = [u8; 4];

struct CpuSlot {
    width: u32,
    height: u32,
    render_target: Vec<Rgba>,
    display: Vec<Rgba>,
}

impl CpuSlot {
    fn new(width: u32, height: u32) -> Self {
        let texels = width as usize * height as usize;
        Self {
            width,
            height,
            render_target: vec![[0; 4]; texels],
            display: vec![[0; 4]; texels],
        }
    }
}

pub struct SoftwareBackend {
    max_texture_size: u32,
    slots: HashMap<SlotId, CpuSlot>,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::with_max_texture_size(8192)
    }

    pub fn with_max_texture_size(max_texture_size: u32) -> Self {
        Self {
            max_texture_size,
            slots: HashMap::new(),
        }
    }

    fn check_size(&self, width: u32, height: u32) -> Result<(), RenderError> {
        if width > self.max_texture_size || height > self.max_texture_size {
            return Err(RenderError::TooLarge {
                width,
                height,
                max: self.max_texture_size,
            });
        }
        Ok(())
    }
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBackend for SoftwareBackend {
    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            backend: BackendType::Software,
            adapter_name: "software".to_string(),
            max_texture_size: self.max_texture_size,
        }
    }

    fn allocate(&mut self, slot: SlotId, width: u32, height: u32) -> Result<(), RenderError> {
        self.check_size(width, height)?;
        if self.slots.contains_key(&slot) {
            return Err(RenderError::SlotInUse(slot));
        }
        self.slots.insert(slot, CpuSlot::new(width, height));
        Ok(())
    }

    fn resize(&mut self, slot: SlotId, width: u32, height: u32) -> Result<(), RenderError> {
        self.check_size(width, height)?;
        let cpu = self.slots.get_mut(&slot).ok_or(RenderError::UnknownSlot(slot))?;
        *cpu = CpuSlot::new(width, height);
        Ok(())
    }

    fn update(&mut self, slot: SlotId, image: &ThumbnailImage) -> Result<(), RenderError> {
        let cpu = self.slots.get_mut(&slot).ok_or(RenderError::UnknownSlot(slot))?;
        if image.size() != (cpu.width, cpu.height) {
            return Err(RenderError::SizeMismatch {
                slot,
                expected: (cpu.width, cpu.height),
                actual: image.size(),
            });
        }

        let texels: &[Rgba] = bytemuck::cast_slice(image.pixels());
        cpu.render_target.copy_from_slice(texels);
        cpu.display.copy_from_slice(&cpu.render_target);
        Ok(())
    }

    fn release(&mut self, slot: SlotId) -> Result<(), RenderError> {
        self.slots
            .remove(&slot)
            .map(|_| ())
            .ok_or(RenderError::UnknownSlot(slot))
    }

    fn read_display(&mut self, slot: SlotId) -> Result<ThumbnailImage, RenderError> {
        let cpu = self.slots.get(&slot).ok_or(RenderError::UnknownSlot(slot))?;
        let bytes: &[u8] = bytemuck::cast_slice(&cpu.display);
        Ok(ThumbnailImage::from_rgba8(cpu.width, cpu.height, bytes.to_vec())?)
    }

    fn live_slots(&self) -> usize {
        self.slots.len()
    }
}
