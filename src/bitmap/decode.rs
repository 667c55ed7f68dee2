//! Pixel unpacking: the functional core of the bitmap domain.
//!
//! Handles indexed (1/4/8-bit via palette) and direct (16/24/32-bit)
//! uncompressed rows, 16/32-bit rows with explicit channel masks
//! (BI_BITFIELDS), 4-byte row padding, and bottom-up storage.

use super::header::{RawBitmapHeader, COMPRESSION_BITFIELDS, COMPRESSION_NONE, HEADER_LEN};
use super::DecodedImage;

/// Decodes a raw bitmap record (info header, optional color table, pixel
/// rows) into a top-down RGBA8 image.
///
/// The input is untrusted: every offset and length is checked before it is
/// used, and the output buffer is only allocated once the source is known
/// to hold every row the header declares.
pub fn decode(bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
    let header = RawBitmapHeader::parse(bytes)?;

    if (header.header_size as usize) < HEADER_LEN {
        return Err(DecodeError::InvalidHeader(format!(
            "header size {} is below {}",
            header.header_size, HEADER_LEN
        )));
    }
    match header.compression {
        COMPRESSION_NONE => {}
        COMPRESSION_BITFIELDS if matches!(header.bit_count, 16 | 32) => {}
        other => return Err(DecodeError::UnsupportedCompression(other)),
    }
    if !matches!(header.bit_count, 1 | 4 | 8 | 16 | 24 | 32) {
        return Err(DecodeError::UnsupportedBitDepth(header.bit_count));
    }
    if header.width <= 0 || header.height == 0 {
        return Err(DecodeError::InvalidHeader(format!(
            "invalid dimensions {}x{}",
            header.width, header.height
        )));
    }

    let offset = header.pixel_offset();
    if bytes.len() < offset {
        return Err(DecodeError::Truncated);
    }

    let width = header.pixel_width();
    let height = header.pixel_height();

    let src_stride = header
        .row_stride()
        .ok_or_else(|| DecodeError::InvalidHeader("row size overflows".to_string()))?;
    let src_len = src_stride
        .checked_mul(height as usize)
        .ok_or_else(|| DecodeError::InvalidHeader("image size overflows".to_string()))?;
    if bytes.len() - offset < src_len {
        return Err(DecodeError::Truncated);
    }

    let dst_stride = (width as usize)
        .checked_mul(4)
        .ok_or_else(|| DecodeError::InvalidHeader("row size overflows".to_string()))?;
    let dst_len = dst_stride
        .checked_mul(height as usize)
        .ok_or_else(|| DecodeError::InvalidHeader("image size overflows".to_string()))?;

    let masks = header.has_bit_fields().then(|| ChannelMasks::read(bytes, &header));
    let table_start = (header.header_size as usize).saturating_add(header.mask_table_len());
    let palette = read_palette(&bytes[table_start..offset]);
    let pixel_data = &bytes[offset..offset + src_len];
    let top_down = header.is_top_down();

    log::debug!(
        "[BITMAP] Decoding {}x{} @ {} bpp ({}, palette {} entries)",
        width,
        height,
        header.bit_count,
        if top_down { "top-down" } else { "bottom-up" },
        palette.len()
    );

    let mut out = vec![0u8; dst_len];
    for out_y in 0..height as usize {
        let src_y = if top_down {
            out_y
        } else {
            height as usize - 1 - out_y
        };
        let src_row = &pixel_data[src_y * src_stride..(src_y + 1) * src_stride];
        let dst_row = &mut out[out_y * dst_stride..(out_y + 1) * dst_stride];
        match &masks {
            Some(masks) => unpack_masked_row(header.bit_count, src_row, dst_row, masks),
            None => unpack_row(header.bit_count, src_row, dst_row, &palette),
        }
    }

    // 32-bit BI_RGB leaves the fourth byte undefined. Most writers zero it;
    // only trust it as alpha when something actually set it.
    if masks.is_none() && header.bit_count == 32 && out.chunks_exact(4).all(|px| px[3] == 0) {
        for px in out.chunks_exact_mut(4) {
            px[3] = 255;
        }
    }

    DecodedImage::from_rgba(width, height, out)
        .ok_or_else(|| DecodeError::InvalidHeader("output buffer mismatch".to_string()))
}

/// Color table entries are BGRX; the fourth byte is reserved, not alpha.
fn read_palette(table: &[u8]) -> Vec<[u8; 4]> {
    table
        .chunks_exact(4)
        .map(|e| [e[2], e[1], e[0], 255])
        .collect()
}

fn unpack_row(bit_count: u16, src: &[u8], dst: &mut [u8], palette: &[[u8; 4]]) {
    let lookup = |index: usize| palette.get(index).copied().unwrap_or([0, 0, 0, 255]);

    for (x, px) in dst.chunks_exact_mut(4).enumerate() {
        let rgba = match bit_count {
            1 => lookup(((src[x / 8] >> (7 - (x % 8))) & 0x01) as usize),
            4 => {
                let byte = src[x / 2];
                let nibble = if x % 2 == 0 { byte >> 4 } else { byte & 0x0F };
                lookup(nibble as usize)
            }
            8 => lookup(src[x] as usize),
            16 => {
                // X1R5G5B5
                let v = u16::from_le_bytes([src[x * 2], src[x * 2 + 1]]);
                [
                    expand_5bit((v >> 10) & 0x1F),
                    expand_5bit((v >> 5) & 0x1F),
                    expand_5bit(v & 0x1F),
                    255,
                ]
            }
            24 => {
                let s = &src[x * 3..x * 3 + 3];
                [s[2], s[1], s[0], 255]
            }
            32 => {
                let s = &src[x * 4..x * 4 + 4];
                [s[2], s[1], s[0], s[3]]
            }
            _ => unreachable!("bit depth validated before unpacking"),
        };
        px.copy_from_slice(&rgba);
    }
}

fn expand_5bit(c: u16) -> u8 {
    ((c << 3) | (c >> 2)) as u8
}

/// Channel masks of a BI_BITFIELDS record. A zero alpha mask means opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChannelMasks {
    red: u32,
    green: u32,
    blue: u32,
    alpha: u32,
}

impl ChannelMasks {
    /// Masks sit at byte 40 whether they trail a 40-byte header or live
    /// inside a V4/V5 one; only the larger headers carry an alpha mask.
    /// The caller has already checked that `bytes` reaches the pixel offset.
    fn read(bytes: &[u8], header: &RawBitmapHeader) -> Self {
        let at = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        let alpha = if header.header_size as usize >= HEADER_LEN + 16 {
            at(HEADER_LEN + 12)
        } else {
            0
        };
        Self {
            red: at(HEADER_LEN),
            green: at(HEADER_LEN + 4),
            blue: at(HEADER_LEN + 8),
            alpha,
        }
    }

    fn rgba(&self, value: u32) -> [u8; 4] {
        let alpha = if self.alpha == 0 {
            255
        } else {
            scale_channel(value, self.alpha)
        };
        [
            scale_channel(value, self.red),
            scale_channel(value, self.green),
            scale_channel(value, self.blue),
            alpha,
        ]
    }
}

/// Extracts the bits under `mask` and scales them to 0..=255.
fn scale_channel(value: u32, mask: u32) -> u8 {
    if mask == 0 {
        return 0;
    }
    let shift = mask.trailing_zeros();
    let max = mask >> shift;
    let bits = 32 - max.leading_zeros();
    let c = (value & mask) >> shift;
    if bits >= 8 {
        (c >> (bits - 8)) as u8
    } else {
        ((c * 255 + max / 2) / max) as u8
    }
}

fn unpack_masked_row(bit_count: u16, src: &[u8], dst: &mut [u8], masks: &ChannelMasks) {
    for (x, px) in dst.chunks_exact_mut(4).enumerate() {
        let value = if bit_count == 16 {
            u16::from_le_bytes([src[x * 2], src[x * 2 + 1]]) as u32
        } else {
            u32::from_le_bytes([src[x * 4], src[x * 4 + 1], src[x * 4 + 2], src[x * 4 + 3]])
        };
        px.copy_from_slice(&masks.rgba(value));
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Bitmap record is truncated")]
    Truncated,

    #[error("Unsupported bitmap compression: {0}")]
    UnsupportedCompression(u32),

    #[error("Unsupported bitmap bit depth: {0}")]
    UnsupportedBitDepth(u16),

    #[error("Invalid bitmap header: {0}")]
    InvalidHeader(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Record {
        width: i32,
        height: i32,
        bit_count: u16,
        compression: u32,
        colors_used: u32,
        palette: Vec<[u8; 4]>,
        rows: Vec<Vec<u8>>,
    }

    impl Record {
        fn new(width: i32, height: i32, bit_count: u16) -> Self {
            Self {
                width,
                height,
                bit_count,
                compression: 0,
                colors_used: 0,
                palette: Vec::new(),
                rows: Vec::new(),
            }
        }

        /// Each row is padded to 4 bytes here, the way a writer would.
        fn bytes(&self) -> Vec<u8> {
            let mut b = Vec::new();
            b.extend_from_slice(&40u32.to_le_bytes());
            b.extend_from_slice(&self.width.to_le_bytes());
            b.extend_from_slice(&self.height.to_le_bytes());
            b.extend_from_slice(&1u16.to_le_bytes());
            b.extend_from_slice(&self.bit_count.to_le_bytes());
            b.extend_from_slice(&self.compression.to_le_bytes());
            b.extend_from_slice(&0u32.to_le_bytes());
            b.extend_from_slice(&0i32.to_le_bytes());
            b.extend_from_slice(&0i32.to_le_bytes());
            b.extend_from_slice(&self.colors_used.to_le_bytes());
            b.extend_from_slice(&0u32.to_le_bytes());
            for entry in &self.palette {
                b.extend_from_slice(entry);
            }
            for row in &self.rows {
                b.extend_from_slice(row);
                b.resize(b.len() + (4 - row.len() % 4) % 4, 0xEE);
            }
            b
        }
    }

    #[test]
    fn twenty_four_bit_bottom_up_is_flipped() {
        let mut rec = Record::new(2, 2, 24);
        // Stored bottom row first.
        rec.rows = vec![
            vec![0, 0, 255, 0, 255, 0],   // bottom: red, green
            vec![255, 0, 0, 255, 255, 255], // top: blue, white
        ];
        let img = decode(&rec.bytes()).unwrap();
        assert_eq!((img.width(), img.height()), (2, 2));
        assert_eq!(img.pixel(0, 0), Some([0, 0, 255, 255]));
        assert_eq!(img.pixel(1, 0), Some([255, 255, 255, 255]));
        assert_eq!(img.pixel(0, 1), Some([255, 0, 0, 255]));
        assert_eq!(img.pixel(1, 1), Some([0, 255, 0, 255]));
    }

    #[test]
    fn negative_height_keeps_row_order() {
        let mut rec = Record::new(1, -2, 24);
        rec.rows = vec![vec![1, 2, 3], vec![4, 5, 6]];
        let img = decode(&rec.bytes()).unwrap();
        assert_eq!(img.height(), 2);
        assert_eq!(img.pixel(0, 0), Some([3, 2, 1, 255]));
        assert_eq!(img.pixel(0, 1), Some([6, 5, 4, 255]));
    }

    #[test]
    fn one_bit_uses_palette_msb_first() {
        let mut rec = Record::new(10, -1, 1);
        rec.palette = vec![[0, 0, 0, 0], [255, 255, 255, 0]];
        rec.rows = vec![vec![0b1010_0000, 0b0100_0000]];
        let img = decode(&rec.bytes()).unwrap();
        assert_eq!(img.pixel(0, 0), Some([255, 255, 255, 255]));
        assert_eq!(img.pixel(1, 0), Some([0, 0, 0, 255]));
        assert_eq!(img.pixel(2, 0), Some([255, 255, 255, 255]));
        assert_eq!(img.pixel(9, 0), Some([255, 255, 255, 255]));
        assert_eq!(img.pixel(8, 0), Some([0, 0, 0, 255]));
    }

    #[test]
    fn four_bit_high_nibble_first() {
        let mut rec = Record::new(3, -1, 4);
        rec.colors_used = 3;
        rec.palette = vec![[0, 0, 0, 0], [0, 0, 255, 0], [255, 0, 0, 0]];
        rec.rows = vec![vec![0x12, 0x00]];
        let img = decode(&rec.bytes()).unwrap();
        assert_eq!(img.pixel(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(img.pixel(1, 0), Some([0, 0, 255, 255]));
        assert_eq!(img.pixel(2, 0), Some([0, 0, 0, 255]));
    }

    #[test]
    fn eight_bit_full_palette_when_colors_used_zero() {
        let mut rec = Record::new(2, 1, 8);
        rec.palette = (0..=255u8).map(|i| [i, i, i, 0]).collect();
        rec.rows = vec![vec![7, 200]];
        let img = decode(&rec.bytes()).unwrap();
        assert_eq!(img.pixel(0, 0), Some([7, 7, 7, 255]));
        assert_eq!(img.pixel(1, 0), Some([200, 200, 200, 255]));
    }

    #[test]
    fn out_of_range_index_is_black() {
        let mut rec = Record::new(1, 1, 8);
        rec.colors_used = 1;
        rec.palette = vec![[9, 9, 9, 0]];
        rec.rows = vec![vec![5]];
        let img = decode(&rec.bytes()).unwrap();
        assert_eq!(img.pixel(0, 0), Some([0, 0, 0, 255]));
    }

    #[test]
    fn sixteen_bit_is_x1r5g5b5() {
        let mut rec = Record::new(2, 1, 16);
        let red: u16 = 0x1F << 10;
        let blue: u16 = 0x10;
        let mut row = red.to_le_bytes().to_vec();
        row.extend_from_slice(&blue.to_le_bytes());
        rec.rows = vec![row];
        let img = decode(&rec.bytes()).unwrap();
        assert_eq!(img.pixel(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(img.pixel(1, 0), Some([0, 0, 132, 255]));
    }

    #[test]
    fn thirty_two_bit_zero_alpha_becomes_opaque() {
        let mut rec = Record::new(1, 1, 32);
        rec.rows = vec![vec![10, 20, 30, 0]];
        let img = decode(&rec.bytes()).unwrap();
        assert_eq!(img.pixel(0, 0), Some([30, 20, 10, 255]));
    }

    #[test]
    fn thirty_two_bit_real_alpha_is_kept() {
        let mut rec = Record::new(2, 1, 32);
        rec.rows = vec![vec![10, 20, 30, 128, 1, 2, 3, 0]];
        let img = decode(&rec.bytes()).unwrap();
        assert_eq!(img.pixel(0, 0), Some([30, 20, 10, 128]));
        assert_eq!(img.pixel(1, 0), Some([3, 2, 1, 0]));
    }

    #[test]
    fn row_padding_is_discarded() {
        // 3 px * 24 bit = 9 bytes, padded to 12.
        let mut rec = Record::new(3, -2, 24);
        rec.rows = vec![vec![1; 9], vec![2; 9]];
        let bytes = rec.bytes();
        assert_eq!(bytes.len(), 40 + 24);
        let img = decode(&bytes).unwrap();
        assert_eq!(img.pixel(2, 0), Some([1, 1, 1, 255]));
        assert_eq!(img.pixel(0, 1), Some([2, 2, 2, 255]));
    }

    #[test]
    fn compression_is_rejected() {
        let mut rec = Record::new(1, 1, 24);
        rec.compression = 1;
        assert!(matches!(
            decode(&rec.bytes()),
            Err(DecodeError::UnsupportedCompression(1))
        ));
    }

    #[test]
    fn run_length_compression_is_rejected() {
        let mut rec = Record::new(2, 1, 4);
        rec.compression = 2;
        rec.palette = vec![[0, 0, 0, 0]; 16];
        rec.rows = vec![vec![0x01]];
        assert!(matches!(
            decode(&rec.bytes()),
            Err(DecodeError::UnsupportedCompression(2))
        ));
    }

    /// Records the three channel masks where a 40-byte header expects them.
    fn with_masks(mut rec: Record, red: u32, green: u32, blue: u32) -> Record {
        rec.compression = 3;
        rec.palette = vec![red.to_le_bytes(), green.to_le_bytes(), blue.to_le_bytes()];
        rec
    }

    #[test]
    fn bit_fields_thirty_two_bit_rgb_masks() {
        let mut rec = with_masks(Record::new(1, 1, 32), 0x00FF_0000, 0x0000_FF00, 0x0000_00FF);
        rec.rows = vec![vec![10, 20, 30, 0]];
        let img = decode(&rec.bytes()).unwrap();
        assert_eq!(img.pixel(0, 0), Some([30, 20, 10, 255]));
    }

    #[test]
    fn bit_fields_masks_choose_channel_order() {
        let mut rec = with_masks(Record::new(1, 1, 32), 0x0000_00FF, 0x0000_FF00, 0x00FF_0000);
        rec.rows = vec![vec![10, 20, 30, 99]];
        let img = decode(&rec.bytes()).unwrap();
        assert_eq!(img.pixel(0, 0), Some([10, 20, 30, 255]));
    }

    #[test]
    fn bit_fields_sixteen_bit_565() {
        let mut rec = with_masks(Record::new(3, -1, 16), 0xF800, 0x07E0, 0x001F);
        let mut row = Vec::new();
        for v in [0xF800u16, 32 << 5, 0x0010] {
            row.extend_from_slice(&v.to_le_bytes());
        }
        rec.rows = vec![row];
        let img = decode(&rec.bytes()).unwrap();
        assert_eq!(img.pixel(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(img.pixel(1, 0), Some([0, 130, 0, 255]));
        assert_eq!(img.pixel(2, 0), Some([0, 0, 132, 255]));
    }

    #[test]
    fn bit_fields_need_direct_color() {
        let mut rec = with_masks(Record::new(1, 1, 24), 0xFF0000, 0xFF00, 0xFF);
        rec.rows = vec![vec![1, 2, 3]];
        assert!(matches!(
            decode(&rec.bytes()),
            Err(DecodeError::UnsupportedCompression(3))
        ));
    }

    #[test]
    fn bit_fields_without_masks_are_truncated() {
        let mut rec = Record::new(1, 1, 32);
        rec.compression = 3;
        assert!(matches!(decode(&rec.bytes()), Err(DecodeError::Truncated)));
    }

    #[test]
    fn scale_channel_widths() {
        assert_eq!(scale_channel(0xFFFF_FFFF, 0), 0);
        assert_eq!(scale_channel(0x1F, 0x1F), 255);
        assert_eq!(scale_channel(0x3FF << 10, 0x3FF << 10), 255);
        assert_eq!(scale_channel(0x200 << 10, 0x3FF << 10), 128);
    }

    #[test]
    fn odd_bit_depth_is_rejected() {
        let rec = Record::new(1, 1, 2);
        assert!(matches!(
            decode(&rec.bytes()),
            Err(DecodeError::UnsupportedBitDepth(2))
        ));
    }

    #[test]
    fn missing_rows_are_truncated() {
        let mut rec = Record::new(2, 2, 24);
        rec.rows = vec![vec![0; 6]];
        assert!(matches!(decode(&rec.bytes()), Err(DecodeError::Truncated)));
    }

    #[test]
    fn missing_palette_is_truncated() {
        let mut rec = Record::new(1, 1, 8);
        rec.palette = vec![[0, 0, 0, 0]; 4];
        assert!(matches!(decode(&rec.bytes()), Err(DecodeError::Truncated)));
    }

    #[test]
    fn zero_width_is_invalid() {
        let rec = Record::new(0, 1, 24);
        assert!(matches!(
            decode(&rec.bytes()),
            Err(DecodeError::InvalidHeader(_))
        ));
    }

    #[test]
    fn huge_dimensions_do_not_allocate() {
        let rec = Record::new(i32::MAX, i32::MIN, 32);
        assert!(decode(&rec.bytes()).is_err());
    }
}
