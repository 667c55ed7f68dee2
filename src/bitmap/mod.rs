//! Raw clipboard bitmap domain: public API.
//!
//! Turns the OS-native device-independent bitmap record (the bytes behind
//! CF_DIB) into a canonical top-down RGBA8 image. Pure code: bytes in,
//! pixels out, no clipboard or OS access.

mod decode;
mod header;

pub use decode::{decode, DecodeError};
pub use header::{RawBitmapHeader, HEADER_LEN};

use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;

/// Canonical decoded image: 8 bits per channel RGBA, rows top-down.
///
/// Owned by whoever receives it; the decoder keeps nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    width: u32,
    height: u32,
    stride: usize,
    pixels: Vec<u8>,
}

impl DecodedImage {
    /// Wraps an RGBA8 buffer. Returns `None` if the buffer length does not
    /// match `width * height * 4` or a dimension is zero.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let stride = (width as usize).checked_mul(4)?;
        if stride.checked_mul(height as usize)? != pixels.len() {
            return None;
        }
        Some(Self {
            width,
            height,
            stride,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per output row (always `width * 4`).
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn as_rgba(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_rgba(self) -> Vec<u8> {
        self.pixels
    }

    /// RGBA value at (x, y), origin top-left.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let at = y as usize * self.stride + x as usize * 4;
        let px = &self.pixels[at..at + 4];
        Some([px[0], px[1], px[2], px[3]])
    }

    /// One output row, top-down.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.stride;
        Some(&self.pixels[start..start + self.stride])
    }

    /// Converts any decoded `image` crate image into the canonical form.
    pub fn from_dynamic(image: DynamicImage) -> Option<Self> {
        let rgba = image.to_rgba8();
        let (w, h) = (rgba.width(), rgba.height());
        Self::from_rgba(w, h, rgba.into_raw())
    }

    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
    }

    /// Encodes the image as PNG bytes.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>, image::ImageError> {
        let rgba = RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| {
                image::ImageError::Parameter(image::error::ParameterError::from_kind(
                    image::error::ParameterErrorKind::DimensionMismatch,
                ))
            })?;

        let mut png_bytes: Vec<u8> = Vec::new();
        DynamicImage::ImageRgba8(rgba).write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)?;
        Ok(png_bytes)
    }
}
