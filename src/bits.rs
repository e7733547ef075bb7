//! Bit-field codec for packed integer fields.
//!
//! Bit ranges are `[low, high)` counted from the least significant bit of the
//! word.  FLAC and WAVE pack their sub-byte fields most-significant-first, so
//! callers load the enclosing bytes big-endian into a `u32`/`u64` and then
//! address fields by their position from the bottom of that word.
//!
//! Writes mask the value to the field width.  Out-of-range values are silently
//! truncated rather than rejected.

use byteorder::{BigEndian, ByteOrder};

// ── Unsigned ──────────────────────────────────────────────────────────────────

#[inline]
fn mask32(width: u32) -> u32 {
    if width >= 32 { u32::MAX } else { (1u32 << width) - 1 }
}

#[inline]
fn mask64(width: u32) -> u64 {
    if width >= 64 { u64::MAX } else { (1u64 << width) - 1 }
}

/// Read bits `[low, high)` of `word`.
pub fn read_bit_range_u32(word: u32, low: u32, high: u32) -> u32 {
    assert!(low < high && high <= 32, "bit range {low}..{high} outside a 32-bit word");
    (word >> low) & mask32(high - low)
}

/// Read bits `[low, high)` of `word`.
pub fn read_bit_range_u64(word: u64, low: u32, high: u32) -> u64 {
    assert!(low < high && high <= 64, "bit range {low}..{high} outside a 64-bit word");
    (word >> low) & mask64(high - low)
}

/// Replace bits `[low, high)` of `word` with `value`, masked to the field width.
pub fn write_bit_range_u32(word: u32, low: u32, high: u32, value: u32) -> u32 {
    assert!(low < high && high <= 32, "bit range {low}..{high} outside a 32-bit word");
    let mask = mask32(high - low) << low;
    (word & !mask) | ((value << low) & mask)
}

/// Replace bits `[low, high)` of `word` with `value`, masked to the field width.
pub fn write_bit_range_u64(word: u64, low: u32, high: u32, value: u64) -> u64 {
    assert!(low < high && high <= 64, "bit range {low}..{high} outside a 64-bit word");
    let mask = mask64(high - low) << low;
    (word & !mask) | ((value << low) & mask)
}

// ── Signed (two's complement) ─────────────────────────────────────────────────

/// Read bits `[low, high)` of `word` as a two's-complement integer.
pub fn read_signed_bit_range_u32(word: u32, low: u32, high: u32) -> i32 {
    assert!(low < high && high <= 32, "bit range {low}..{high} outside a 32-bit word");
    ((word << (32 - high)) as i32) >> (32 - (high - low))
}

/// Read bits `[low, high)` of `word` as a two's-complement integer.
pub fn read_signed_bit_range_u64(word: u64, low: u32, high: u32) -> i64 {
    assert!(low < high && high <= 64, "bit range {low}..{high} outside a 64-bit word");
    ((word << (64 - high)) as i64) >> (64 - (high - low))
}

pub fn write_signed_bit_range_u32(word: u32, low: u32, high: u32, value: i32) -> u32 {
    write_bit_range_u32(word, low, high, value as u32)
}

pub fn write_signed_bit_range_u64(word: u64, low: u32, high: u32, value: i64) -> u64 {
    write_bit_range_u64(word, low, high, value as u64)
}

// ── Byte-span helpers ─────────────────────────────────────────────────────────

/// Read bits `[low, high)` from the most significant end of `bytes`.
///
/// `bytes` (at most 8 of them) is loaded as a big-endian integer, so bit 0 of
/// the range is the least significant bit of the last byte.
pub fn read_be_bits(bytes: &[u8], low: u32, high: u32) -> u64 {
    assert!(!bytes.is_empty() && bytes.len() <= 8, "between 1 and 8 bytes required");
    let word = BigEndian::read_uint(bytes, bytes.len());
    read_bit_range_u64(word, low, high)
}

/// Overwrite bits `[low, high)` of the big-endian integer held in `bytes`.
pub fn write_be_bits(bytes: &mut [u8], low: u32, high: u32, value: u64) {
    assert!(!bytes.is_empty() && bytes.len() <= 8, "between 1 and 8 bytes required");
    let len = bytes.len();
    let word = BigEndian::read_uint(bytes, len);
    BigEndian::write_uint(bytes, write_bit_range_u64(word, low, high, value), len);
}
