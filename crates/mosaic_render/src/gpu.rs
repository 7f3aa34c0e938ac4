//! wgpu backend
//!
//! Each slot owns two textures: a render target the thumbnail is drawn into
//! and a display texture the UI samples. Updates write the target and copy it
//! to the display texture in one submission.

use crate::backend::RenderBackend;
use crate::{BackendType, DeviceCapabilities, RenderError, SlotId};
use mosaic_asset::ThumbnailImage;
use std::collections::HashMap;
use std::sync::mpsc;

const THUMBNAIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

struct GpuSlot {
    width: u32,
    height: u32,
    render_target: wgpu::Texture,
    display: wgpu::Texture,
}

impl GpuSlot {
    fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }

    fn destroy(self) {
        self.render_target.destroy();
        self.display.destroy();
    }
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    backend: BackendType,
    adapter_name: String,
    slots: HashMap<SlotId, GpuSlot>,
}

impl WgpuBackend {
    /// Request an adapter and device without a surface.
    pub fn new_headless() -> Result<Self, RenderError> {
        pollster::block_on(Self::request())
    }

    async fn request() -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;

        let info = adapter.get_info();
        tracing::info!(adapter = %info.name, backend = ?info.backend, "thumbnail GPU adapter");

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Thumbnail Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults(),
                    memory_hints: wgpu::MemoryHints::MemoryUsage,
                },
                None,
            )
            .await
            .map_err(|err| RenderError::Device(err.to_string()))?;

        Ok(Self {
            device,
            queue,
            backend: backend_type(info.backend),
            adapter_name: info.name,
            slots: HashMap::new(),
        })
    }

    fn max_texture_size(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    fn create_slot(&self, slot: SlotId, width: u32, height: u32) -> Result<GpuSlot, RenderError> {
        let max = self.max_texture_size();
        if width == 0 || height == 0 || width > max || height > max {
            return Err(RenderError::TooLarge { width, height, max });
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let target_label = format!("Thumbnail Render Target {slot}");
        let display_label = format!("Thumbnail Display {slot}");

        let render_target = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&target_label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: THUMBNAIL_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let display = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&display_label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: THUMBNAIL_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        Ok(GpuSlot {
            width,
            height,
            render_target,
            display,
        })
    }
}

impl RenderBackend for WgpuBackend {
    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            backend: self.backend,
            adapter_name: self.adapter_name.clone(),
            max_texture_size: self.max_texture_size(),
        }
    }

    fn allocate(&mut self, slot: SlotId, width: u32, height: u32) -> Result<(), RenderError> {
        if self.slots.contains_key(&slot) {
            return Err(RenderError::SlotInUse(slot));
        }
        let gpu = self.create_slot(slot, width, height)?;
        self.slots.insert(slot, gpu);
        Ok(())
    }

    fn resize(&mut self, slot: SlotId, width: u32, height: u32) -> Result<(), RenderError> {
        if !self.slots.contains_key(&slot) {
            return Err(RenderError::UnknownSlot(slot));
        }
        let gpu = self.create_slot(slot, width, height)?;
        if let Some(old) = self.slots.insert(slot, gpu) {
            old.destroy();
        }
        Ok(())
    }

    fn update(&mut self, slot: SlotId, image: &ThumbnailImage) -> Result<(), RenderError> {
        let gpu = self.slots.get(&slot).ok_or(RenderError::UnknownSlot(slot))?;
        if image.size() != (gpu.width, gpu.height) {
            return Err(RenderError::SizeMismatch {
                slot,
                expected: (gpu.width, gpu.height),
                actual: image.size(),
            });
        }

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &gpu.render_target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.pixels(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(image.row_pitch()),
                rows_per_image: Some(image.height()),
            },
            gpu.extent(),
        );

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Thumbnail Copy Encoder"),
            });
        encoder.copy_texture_to_texture(
            gpu.render_target.as_image_copy(),
            gpu.display.as_image_copy(),
            gpu.extent(),
        );
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn release(&mut self, slot: SlotId) -> Result<(), RenderError> {
        let gpu = self.slots.remove(&slot).ok_or(RenderError::UnknownSlot(slot))?;
        gpu.destroy();
        Ok(())
    }

    fn read_display(&mut self, slot: SlotId) -> Result<ThumbnailImage, RenderError> {
        let gpu = self.slots.get(&slot).ok_or(RenderError::UnknownSlot(slot))?;

        let bytes_per_row = gpu.width * ThumbnailImage::BYTES_PER_PIXEL as u32;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = bytes_per_row.div_ceil(align) * align;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Thumbnail Readback"),
            size: padded_bytes_per_row as u64 * gpu.height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Thumbnail Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            gpu.display.as_image_copy(),
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(gpu.height),
                },
            },
            gpu.extent(),
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|err| RenderError::Readback(err.to_string()))?
            .map_err(|err| RenderError::Readback(err.to_string()))?;

        let mut pixels = Vec::with_capacity(bytes_per_row as usize * gpu.height as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks(padded_bytes_per_row as usize) {
                pixels.extend_from_slice(&row[..bytes_per_row as usize]);
            }
        }
        buffer.unmap();

        Ok(ThumbnailImage::from_rgba8(gpu.width, gpu.height, pixels)?)
    }

    fn live_slots(&self) -> usize {
        self.slots.len()
    }
}

impl Drop for WgpuBackend {
    fn drop(&mut self) {
        for (_, gpu) in self.slots.drain() {
            gpu.destroy();
        }
    }
}

fn backend_type(backend: wgpu::Backend) -> BackendType {
    match backend {
        wgpu::Backend::Metal => BackendType::Metal,
        wgpu::Backend::Dx12 => BackendType::DirectX12,
        wgpu::Backend::Vulkan => BackendType::Vulkan,
        wgpu::Backend::Gl => BackendType::OpenGL,
        wgpu::Backend::BrowserWebGpu => BackendType::WebGpu,
        wgpu::Backend::Empty => BackendType::Software,
    }
}
