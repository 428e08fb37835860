//! Low-level bit read and write primitives for byte slices.
//!
//! Bits are addressed LSB-first inside a byte: bit offset 0 is the least
//! significant bit. Sub-byte values (1..=7 bits) never span two bytes;
//! 8, 16 and 32-bit values must start on a byte boundary and are big-endian.

use crate::errors::{ReadError, WriteError};

const fn build_masks() -> [[u8; 8]; 8] {
    let mut table = [[0u8; 8]; 8];
    let mut width = 1;
    while width < 8 {
        let mut offset = 0;
        while offset + width <= 8 {
            table[width][offset] = (((1u16 << width) - 1) << offset) as u8;
            offset += 1;
        }
        width += 1;
    }

    table
}

/// `MASKS[width][offset]` selects `width` bits starting at `offset`.
/// Entries where `width + offset > 8` are zero and never used.
pub const MASKS: [[u8; 8]; 8] = build_masks();

/// Bit-precise position inside a buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor {
    pub byte: usize,
    pub bit: u8,
}

impl Cursor {
    pub fn new(byte: usize) -> Self {
        Cursor { byte, bit: 0 }
    }

    pub fn is_aligned(&self) -> bool {
        self.bit == 0
    }

    /// Moves forward by `bits`, carrying into the byte index.
    pub fn advance(&mut self, bits: usize) {
        let total = self.bit as usize + bits;
        self.byte += total / 8;
        self.bit = (total % 8) as u8;
    }

    /// First byte offset not touched by anything before the cursor.
    pub fn end(&self) -> usize {
        if self.is_aligned() {
            self.byte
        } else {
            self.byte + 1
        }
    }
}

/// Writes `value` into `width` bits at (`byte_offset`, `bit_offset`).
///
/// Sub-byte writes keep the bits outside the target range; byte-aligned
/// widths overwrite whole bytes.
pub fn write_bits(
    buf: &mut [u8],
    byte_offset: usize,
    bit_offset: u8,
    width: u8,
    value: u64,
) -> Result<(), WriteError> {
    check_width(width, bit_offset).map_err(|err| match err {
        WidthCheck::Cross => WriteError::CrossByteBoundary { bit_offset, width },
        WidthCheck::Unsupported => WriteError::UnsupportedWidth(width),
    })?;

    if width < 64 && value >> width != 0 {
        return Err(WriteError::ValueOutOfRange { value, width });
    }

    if width < 8 {
        let mask = MASKS[width as usize][bit_offset as usize];
        let byte = buf.get_mut(byte_offset).ok_or(WriteError::OutOfBounds)?;
        *byte = (*byte & !mask) | (((value as u8) << bit_offset) & mask);
        return Ok(());
    }

    let len = width as usize / 8;
    let target = byte_offset
        .checked_add(len)
        .and_then(|end| buf.get_mut(byte_offset..end))
        .ok_or(WriteError::OutOfBounds)?;
    target.copy_from_slice(&value.to_be_bytes()[8 - len..]);

    Ok(())
}

/// Reads `width` bits at (`byte_offset`, `bit_offset`). Mirror of [write_bits].
pub fn read_bits(
    data: &[u8],
    byte_offset: usize,
    bit_offset: u8,
    width: u8,
) -> Result<u64, ReadError> {
    check_width(width, bit_offset).map_err(|err| match err {
        WidthCheck::Cross => ReadError::CrossByteBoundary { bit_offset, width },
        WidthCheck::Unsupported => ReadError::UnsupportedWidth(width),
    })?;

    if width < 8 {
        let byte = *data.get(byte_offset).ok_or(ReadError::OutOfBounds)?;
        let mask = MASKS[width as usize][bit_offset as usize];
        return Ok(((byte & mask) >> bit_offset) as u64);
    }

    let bytes = read_raw(data, byte_offset, width as usize / 8)?;
    Ok(bytes
        .iter()
        .fold(0u64, |acc, &byte| (acc << 8) | byte as u64))
}

/// Copies `bytes` verbatim into `buf` at `byte_offset`.
pub fn write_raw(buf: &mut [u8], byte_offset: usize, bytes: &[u8]) -> Result<(), WriteError> {
    let target = byte_offset
        .checked_add(bytes.len())
        .and_then(|end| buf.get_mut(byte_offset..end))
        .ok_or(WriteError::OutOfBounds)?;
    target.copy_from_slice(bytes);

    Ok(())
}

/// Slices `len` raw bytes starting at `byte_offset`.
pub fn read_raw(data: &[u8], byte_offset: usize, len: usize) -> Result<&[u8], ReadError> {
    byte_offset
        .checked_add(len)
        .and_then(|end| data.get(byte_offset..end))
        .ok_or(ReadError::OutOfBounds)
}

enum WidthCheck {
    Cross,
    Unsupported,
}

fn check_width(width: u8, bit_offset: u8) -> Result<(), WidthCheck> {
    match width {
        1..=7 if bit_offset as u16 + width as u16 > 8 => Err(WidthCheck::Cross),
        1..=7 => Ok(()),
        8 | 16 | 32 if bit_offset != 0 => Err(WidthCheck::Cross),
        8 | 16 | 32 => Ok(()),
        _ => Err(WidthCheck::Unsupported),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_table() {
        assert_eq!(MASKS[1][0], 0b0000_0001);
        assert_eq!(MASKS[1][7], 0b1000_0000);
        assert_eq!(MASKS[3][2], 0b0001_1100);
        assert_eq!(MASKS[7][1], 0b1111_1110);
        assert_eq!(MASKS[4][5], 0);

        for width in 1..8usize {
            for offset in 0..8usize {
                let mask = MASKS[width][offset];
                if width + offset > 8 {
                    assert_eq!(mask, 0, "{width}x{offset}");
                } else {
                    assert_eq!(mask.count_ones() as usize, width, "{width}x{offset}");
                    assert_eq!(mask.trailing_zeros() as usize, offset, "{width}x{offset}");
                }
            }
        }
    }

    #[test]
    fn test_write_bit_lsb_first() {
        let mut buf = [0u8];
        write_bits(&mut buf, 0, 0, 1, 1).unwrap();
        assert_eq!(buf, [0b0000_0001]);
        write_bits(&mut buf, 0, 7, 1, 1).unwrap();
        assert_eq!(buf, [0b1000_0001]);
    }

    #[test]
    fn test_write_keeps_neighbours() {
        let mut buf = [0b1111_1111];
        write_bits(&mut buf, 0, 2, 3, 0b010).unwrap();
        assert_eq!(buf, [0b1110_1011]);
        assert_eq!(read_bits(&buf, 0, 2, 3).unwrap(), 0b010);
    }

    #[test]
    fn test_packed_byte() {
        let mut buf = [0u8];
        write_bits(&mut buf, 0, 0, 4, 0x5).unwrap();
        write_bits(&mut buf, 0, 4, 4, 0xa).unwrap();
        assert_eq!(buf, [0xa5]);
        assert_eq!(read_bits(&buf, 0, 0, 4).unwrap(), 0x5);
        assert_eq!(read_bits(&buf, 0, 4, 4).unwrap(), 0xa);
    }

    #[test]
    fn test_big_endian() {
        let mut buf = [0u8; 7];
        write_bits(&mut buf, 0, 0, 8, 0x01).unwrap();
        write_bits(&mut buf, 1, 0, 16, 0x0203).unwrap();
        write_bits(&mut buf, 3, 0, 32, 0x0405_0607).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(read_bits(&buf, 1, 0, 16).unwrap(), 0x0203);
        assert_eq!(read_bits(&buf, 3, 0, 32).unwrap(), 0x0405_0607);
    }

    #[test]
    fn test_cross_byte_boundary() {
        let mut buf = [0u8; 4];
        assert_eq!(
            write_bits(&mut buf, 0, 6, 3, 0).unwrap_err(),
            WriteError::CrossByteBoundary {
                bit_offset: 6,
                width: 3
            }
        );
        assert_eq!(
            write_bits(&mut buf, 0, 1, 16, 0).unwrap_err(),
            WriteError::CrossByteBoundary {
                bit_offset: 1,
                width: 16
            }
        );
        assert_eq!(
            read_bits(&buf, 0, 4, 8).unwrap_err(),
            ReadError::CrossByteBoundary {
                bit_offset: 4,
                width: 8
            }
        );
    }

    #[test]
    fn test_unsupported_width() {
        let mut buf = [0u8; 8];
        assert_eq!(
            write_bits(&mut buf, 0, 0, 12, 0).unwrap_err(),
            WriteError::UnsupportedWidth(12)
        );
        assert_eq!(
            read_bits(&buf, 0, 0, 0).unwrap_err(),
            ReadError::UnsupportedWidth(0)
        );
    }

    #[test]
    fn test_value_out_of_range() {
        let mut buf = [0u8; 2];
        assert_eq!(
            write_bits(&mut buf, 0, 0, 3, 8).unwrap_err(),
            WriteError::ValueOutOfRange { value: 8, width: 3 }
        );
        assert!(write_bits(&mut buf, 0, 0, 8, 256).is_err());
    }

    #[test]
    fn test_out_of_bounds() {
        let mut buf = [0u8; 1];
        assert_eq!(
            write_bits(&mut buf, 0, 0, 16, 1).unwrap_err(),
            WriteError::OutOfBounds
        );
        assert_eq!(read_bits(&buf, 1, 0, 1).unwrap_err(), ReadError::OutOfBounds);
        assert_eq!(read_raw(&buf, 0, 2).unwrap_err(), ReadError::OutOfBounds);
        assert_eq!(read_raw(&buf, usize::MAX, 2).unwrap_err(), ReadError::OutOfBounds);
    }

    #[test]
    fn test_raw() {
        let mut buf = [0u8; 8];
        write_raw(&mut buf, 0, b"string12").unwrap();
        assert_eq!(read_raw(&buf, 0, 8).unwrap(), b"string12");
        assert_eq!(write_raw(&mut buf, 4, b"too long").unwrap_err(), WriteError::OutOfBounds);
    }

    #[test]
    fn test_cursor_advance() {
        let mut cursor = Cursor::new(0);
        cursor.advance(3);
        assert_eq!(cursor, Cursor { byte: 0, bit: 3 });
        assert_eq!(cursor.end(), 1);
        cursor.advance(5);
        assert_eq!(cursor, Cursor { byte: 1, bit: 0 });
        assert!(cursor.is_aligned());
        cursor.advance(32);
        assert_eq!(cursor.end(), 5);
    }
}
