//! RGBA8 pixel buffers produced by thumbnail renderers

use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, ImageEncoder, ImageFormat, RgbaImage};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PixelError {
    #[error("thumbnail dimensions must be non-zero (got {width}x{height})")]
    ZeroSize { width: u32, height: u32 },

    #[error("expected {expected} bytes for {width}x{height} RGBA8, got {actual}")]
    LengthMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("png codec failed: {0}")]
    Codec(#[from] image::ImageError),
}

/// Tightly packed RGBA8 image, row-major, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl ThumbnailImage {
    pub const BYTES_PER_PIXEL: usize = 4;

    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, PixelError> {
        if width == 0 || height == 0 {
            return Err(PixelError::ZeroSize { width, height });
        }
        let expected = width as usize * height as usize * Self::BYTES_PER_PIXEL;
        if pixels.len() != expected {
            return Err(PixelError::LengthMismatch {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Image of a single colour.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self, PixelError> {
        let count = width as usize * height as usize;
        Self::from_rgba8(width, height, rgba.repeat(count))
    }

    /// Build an image by evaluating `shade` for every pixel.
    pub fn from_fn(
        width: u32,
        height: u32,
        mut shade: impl FnMut(u32, u32) -> [u8; 4],
    ) -> Result<Self, PixelError> {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * Self::BYTES_PER_PIXEL);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&shade(x, y));
            }
        }
        Self::from_rgba8(width, height, pixels)
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

    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Bytes per row without padding.
    #[inline]
    pub fn row_pitch(&self) -> u32 {
        self.width * Self::BYTES_PER_PIXEL as u32
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * Self::BYTES_PER_PIXEL;
        let px = &self.pixels[offset..offset + Self::BYTES_PER_PIXEL];
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Nearest-neighbour resample. Returns a plain copy when the size already matches.
    pub fn resized(&self, width: u32, height: u32) -> Result<Self, PixelError> {
        if (width, height) == self.size() {
            return Ok(self.clone());
        }
        if width == 0 || height == 0 {
            return Err(PixelError::ZeroSize { width, height });
        }
        let source = self.to_rgba_image()?;
        let scaled = imageops::resize(&source, width, height, FilterType::Nearest);
        Self::from_rgba8(width, height, scaled.into_raw())
    }

    /// Lossless PNG encoding used for serialized thumbnails.
    pub fn encode_png(&self) -> Result<Vec<u8>, PixelError> {
        let mut bytes = Vec::new();
        PngEncoder::new(&mut bytes).write_image(
            &self.pixels,
            self.width,
            self.height,
            ExtendedColorType::Rgba8,
        )?;
        Ok(bytes)
    }

    pub fn decode_png(bytes: &[u8]) -> Result<Self, PixelError> {
        let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Png)?.into_rgba8();
        let (width, height) = decoded.dimensions();
        Self::from_rgba8(width, height, decoded.into_raw())
    }

    fn to_rgba_image(&self) -> Result<RgbaImage, PixelError> {
        RgbaImage::from_raw(self.width, self.height, self.pixels.clone()).ok_or(
            PixelError::LengthMismatch {
                width: self.width,
                height: self.height,
                expected: self.width as usize * self.height as usize * Self::BYTES_PER_PIXEL,
                actual: self.pixels.len(),
            },
        )
    }
}
