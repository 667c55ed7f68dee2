//! BITMAPINFOHEADER parsing and layout arithmetic.

use super::DecodeError;

/// Length of the fixed info header every supported record starts with.
pub const HEADER_LEN: usize = 40;

/// Uncompressed (BI_RGB).
pub(crate) const COMPRESSION_NONE: u32 = 0;

/// Uncompressed with explicit channel masks (BI_BITFIELDS). 16/32-bit only.
pub(crate) const COMPRESSION_BITFIELDS: u32 = 3;

/// Three u32 channel masks that follow a 40-byte header under BI_BITFIELDS.
const MASK_TABLE_LEN: usize = 12;

/// The fixed 40-byte header of a raw bitmap record, little-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawBitmapHeader {
    pub header_size: u32,
    pub width: i32,
    pub height: i32,
    pub planes: u16,
    pub bit_count: u16,
    pub compression: u32,
    pub image_size: u32,
    pub x_pels_per_meter: i32,
    pub y_pels_per_meter: i32,
    pub colors_used: u32,
    pub colors_important: u32,
}

impl RawBitmapHeader {
    /// Reads the header fields. Fails with `Truncated` below 40 bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_LEN {
            return Err(DecodeError::Truncated);
        }

        let u32_at = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let i32_at = |at: usize| i32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let u16_at = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);

        Ok(Self {
            header_size: u32_at(0),
            width: i32_at(4),
            height: i32_at(8),
            planes: u16_at(12),
            bit_count: u16_at(14),
            compression: u32_at(16),
            image_size: u32_at(20),
            x_pels_per_meter: i32_at(24),
            y_pels_per_meter: i32_at(28),
            colors_used: u32_at(32),
            colors_important: u32_at(36),
        })
    }

    /// Negative height means the rows are already stored top-down.
    pub fn is_top_down(&self) -> bool {
        self.height < 0
    }

    pub fn pixel_width(&self) -> u32 {
        self.width.unsigned_abs()
    }

    pub fn pixel_height(&self) -> u32 {
        self.height.unsigned_abs()
    }

    /// Number of palette entries that follow the header.
    ///
    /// Only indexed depths (≤ 8 bits) carry a table; `colors_used == 0`
    /// means the full `1 << bit_count` entries.
    pub fn palette_len(&self) -> usize {
        if self.bit_count > 8 {
            return 0;
        }
        if self.colors_used != 0 {
            self.colors_used as usize
        } else {
            1usize << self.bit_count
        }
    }

    /// Byte size of the color table (4 bytes per BGRX entry).
    pub fn color_table_len(&self) -> usize {
        self.palette_len() * 4
    }

    pub fn has_bit_fields(&self) -> bool {
        self.compression == COMPRESSION_BITFIELDS
    }

    /// Bytes of channel masks stored between the header and the pixels.
    ///
    /// Only a plain 40-byte header is followed by the masks; larger (V4/V5)
    /// headers carry them inside the header itself.
    pub fn mask_table_len(&self) -> usize {
        if self.has_bit_fields() && self.header_size as usize == HEADER_LEN {
            MASK_TABLE_LEN
        } else {
            0
        }
    }

    /// Offset of the first pixel row from the start of the record.
    pub fn pixel_offset(&self) -> usize {
        (self.header_size as usize)
            .saturating_add(self.mask_table_len())
            .saturating_add(self.color_table_len())
    }

    /// Source bytes per scan row, padded to a 4-byte boundary.
    pub fn row_stride(&self) -> Option<usize> {
        let bits = (self.bit_count as u64).checked_mul(self.pixel_width() as u64)?;
        let stride = (bits.checked_add(31)? / 32) * 4;
        usize::try_from(stride).ok()
    }
}
