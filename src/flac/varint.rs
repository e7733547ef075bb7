//! The variable-length integer coding FLAC uses for frame and sample numbers.
//!
//! The prefix scheme is borrowed from UTF-8 (a run of leading one bits gives
//! the total byte count, continuation bytes carry six bits each behind a `10`
//! marker) but the payload is an unsigned integer, not a code point, so
//! surrogates and overlong forms are not rejected.
//!
//! | First byte  | Bytes | Value bits |
//! |-------------|-------|------------|
//! | `0xxxxxxx`  | 1     | 7  |
//! | `110xxxxx`  | 2     | 11 |
//! | `1110xxxx`  | 3     | 16 |
//! | `11110xxx`  | 4     | 21 |
//! | `111110xx`  | 5     | 26 |
//! | `1111110x`  | 6     | 31 |

use thiserror::Error;

pub const MAX_ENCODED_LENGTH: usize = 6;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarintError {
    #[error("unsupported prefix byte 0x{0:02X}")]
    UnsupportedPrefix(u8),
    #[error("not enough bytes: prefix requires {required}, {available} available")]
    NotEnoughBytes { required: usize, available: usize },
    #[error("continuation byte {index} lacks the 10 marker bits")]
    BadContinuationBits { index: usize },
}

/// Leading-byte value mask and continuation count for a prefix byte.
fn prefix(first: u8) -> Option<(u8, usize)> {
    match first.leading_ones() {
        0 => Some((0x7F, 0)),
        2 => Some((0x1F, 1)),
        3 => Some((0x0F, 2)),
        4 => Some((0x07, 3)),
        5 => Some((0x03, 4)),
        6 => Some((0x01, 5)),
        _ => None,
    }
}

/// Decode one integer from the front of `bytes`.
///
/// Returns the value and the number of bytes it occupied.
///
/// # Panics
/// If `bytes` is empty.
pub fn decode(bytes: &[u8]) -> Result<(u64, usize), VarintError> {
    assert!(!bytes.is_empty(), "varint decode needs at least one byte");

    let first = bytes[0];
    let (mask, left) = prefix(first).ok_or(VarintError::UnsupportedPrefix(first))?;

    if bytes.len() - 1 < left {
        return Err(VarintError::NotEnoughBytes { required: left + 1, available: bytes.len() });
    }

    let mut value = (first & mask) as u64;
    for (index, &byte) in bytes.iter().enumerate().take(left + 1).skip(1) {
        if byte & 0xC0 != 0x80 {
            return Err(VarintError::BadContinuationBits { index });
        }
        value = (value << 6) | (byte & 0x3F) as u64;
    }

    Ok((value, left + 1))
}

/// Encode `value` in the shortest form.  Values wider than 31 bits are not
/// representable and yield `None`.
pub fn encode(value: u64) -> Option<Vec<u8>> {
    if value < 0x80 {
        return Some(vec![value as u8]);
    }
    let left = match value {
        v if v < 1 << 11 => 1,
        v if v < 1 << 16 => 2,
        v if v < 1 << 21 => 3,
        v if v < 1 << 26 => 4,
        v if v < 1 << 31 => 5,
        _ => return None,
    };

    let marker = !(0xFFu8 >> (left + 1));
    let mut out = Vec::with_capacity(left + 1);
    out.push(marker | (value >> (6 * left)) as u8);
    for i in (0..left).rev() {
        out.push(0x80 | ((value >> (6 * i)) & 0x3F) as u8);
    }
    Some(out)
}
