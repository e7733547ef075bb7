//! Fixed-offset STREAMINFO fields.
//!
//! STREAMINFO is always the first metadata block, so every field lives at a
//! known absolute offset and can be read without walking the block chain:
//!
//! | Offset | Bits | Field |
//! |--------|------|-------|
//! | 8      | 16   | minimum block size |
//! | 10     | 16   | maximum block size |
//! | 12     | 24   | minimum frame size |
//! | 15     | 24   | maximum frame size |
//! | 18     | 20   | sample rate |
//! | 20.4   | 3    | channels - 1 |
//! | 20.7   | 5    | bits per sample - 1 |
//! | 21.4   | 36   | total samples |
//! | 26     | 128  | MD5 of the decoded audio |
//!
//! Only the total-samples field is ever written.  It shares its first byte
//! with the bit-depth field, so writes go through a read-modify-write of the
//! enclosing five bytes.

use serde::Serialize;
use tracing::trace;

use crate::bits;
use crate::flac::FlacError;
use crate::source::{ByteSink, ByteSource};

pub const STREAMINFO_PAYLOAD_LENGTH: u32 = 34;
/// Magic + block header + payload.
pub const STREAMINFO_BLOCK_END: u64 = 42;

pub const BLOCK_SIZE_OFFSET:    u64 = 8;
pub const FRAME_SIZE_OFFSET:    u64 = 12;
pub const SAMPLE_RATE_OFFSET:   u64 = 18;
pub const CHANNELS_OFFSET:      u64 = 20;
pub const BIT_DEPTH_OFFSET:     u64 = 20;
pub const TOTAL_SAMPLES_OFFSET: u64 = 21;
pub const MD5_OFFSET:           u64 = 26;

pub const MAX_TOTAL_SAMPLES: u64 = (1 << 36) - 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamInfo {
    pub min_block_size:  u16,
    pub max_block_size:  u16,
    pub min_frame_size:  u32,
    pub max_frame_size:  u32,
    pub sample_rate:     u32,
    pub channels:        u8,
    pub bits_per_sample: u8,
    pub total_samples:   u64,
    #[serde(serialize_with = "serialize_md5")]
    pub md5:             [u8; 16],
}

fn serialize_md5<S: serde::Serializer>(md5: &[u8; 16], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(md5))
}

fn read_fixed<S: ByteSource + ?Sized, const N: usize>(
    source: &mut S,
    offset: u64,
) -> Result<[u8; N], FlacError> {
    let mut buf = [0u8; N];
    if source.read_at(offset, &mut buf)? < N {
        return Err(FlacError::FileTooShort);
    }
    Ok(buf)
}

// ── Readers ───────────────────────────────────────────────────────────────────

pub fn read_min_block_size<S: ByteSource + ?Sized>(source: &mut S) -> Result<u16, FlacError> {
    let b: [u8; 2] = read_fixed(source, BLOCK_SIZE_OFFSET)?;
    Ok(u16::from_be_bytes(b))
}

pub fn read_max_block_size<S: ByteSource + ?Sized>(source: &mut S) -> Result<u16, FlacError> {
    let b: [u8; 2] = read_fixed(source, BLOCK_SIZE_OFFSET + 2)?;
    Ok(u16::from_be_bytes(b))
}

pub fn read_min_frame_size<S: ByteSource + ?Sized>(source: &mut S) -> Result<u32, FlacError> {
    let b: [u8; 3] = read_fixed(source, FRAME_SIZE_OFFSET)?;
    Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
}

pub fn read_max_frame_size<S: ByteSource + ?Sized>(source: &mut S) -> Result<u32, FlacError> {
    let b: [u8; 3] = read_fixed(source, FRAME_SIZE_OFFSET + 3)?;
    Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
}

pub fn read_sample_rate<S: ByteSource + ?Sized>(source: &mut S) -> Result<u32, FlacError> {
    let b: [u8; 3] = read_fixed(source, SAMPLE_RATE_OFFSET)?;
    Ok(bits::read_be_bits(&b, 4, 24) as u32)
}

pub fn read_channels<S: ByteSource + ?Sized>(source: &mut S) -> Result<u8, FlacError> {
    let b: [u8; 1] = read_fixed(source, CHANNELS_OFFSET)?;
    Ok(bits::read_be_bits(&b, 1, 4) as u8 + 1)
}

pub fn read_bit_depth<S: ByteSource + ?Sized>(source: &mut S) -> Result<u8, FlacError> {
    let b: [u8; 2] = read_fixed(source, BIT_DEPTH_OFFSET)?;
    Ok(bits::read_be_bits(&b, 4, 9) as u8 + 1)
}

pub fn read_total_samples<S: ByteSource + ?Sized>(source: &mut S) -> Result<u64, FlacError> {
    let b: [u8; 5] = read_fixed(source, TOTAL_SAMPLES_OFFSET)?;
    Ok(bits::read_be_bits(&b, 0, 36))
}

pub fn read_md5<S: ByteSource + ?Sized>(source: &mut S) -> Result<[u8; 16], FlacError> {
    read_fixed(source, MD5_OFFSET)
}

/// Overwrite the 36-bit total-samples field, preserving the bit-depth nibble.
pub fn write_total_samples<S: ByteSink + ?Sized>(sink: &mut S, total: u64) -> Result<(), FlacError> {
    if total > MAX_TOTAL_SAMPLES {
        return Err(FlacError::TotalSamplesTooLarge(total));
    }
    let mut b: [u8; 5] = read_fixed(sink, TOTAL_SAMPLES_OFFSET)?;
    bits::write_be_bits(&mut b, 0, 36, total);
    trace!(total, "writing total samples");
    sink.write_at(TOTAL_SAMPLES_OFFSET, &b)?;
    Ok(())
}

impl StreamInfo {
    pub fn read<S: ByteSource + ?Sized>(source: &mut S) -> Result<Self, FlacError> {
        let raw: [u8; 34] = read_fixed(source, BLOCK_SIZE_OFFSET)?;
        Ok(Self::from_payload(&raw))
    }

    /// Decode the 34-byte STREAMINFO payload.
    pub fn from_payload(raw: &[u8; 34]) -> Self {
        let mut md5 = [0u8; 16];
        md5.copy_from_slice(&raw[18..34]);
        Self {
            min_block_size:  u16::from_be_bytes([raw[0], raw[1]]),
            max_block_size:  u16::from_be_bytes([raw[2], raw[3]]),
            min_frame_size:  u32::from_be_bytes([0, raw[4], raw[5], raw[6]]),
            max_frame_size:  u32::from_be_bytes([0, raw[7], raw[8], raw[9]]),
            sample_rate:     bits::read_be_bits(&raw[10..13], 4, 24) as u32,
            channels:        bits::read_be_bits(&raw[12..13], 1, 4) as u8 + 1,
            bits_per_sample: bits::read_be_bits(&raw[12..14], 4, 9) as u8 + 1,
            total_samples:   bits::read_be_bits(&raw[13..18], 0, 36),
            md5,
        }
    }

    /// Encode to the 34-byte payload.  Fields wider than their slot are masked.
    pub fn to_payload(&self) -> [u8; 34] {
        let mut raw = [0u8; 34];
        raw[0..2].copy_from_slice(&self.min_block_size.to_be_bytes());
        raw[2..4].copy_from_slice(&self.max_block_size.to_be_bytes());
        raw[4..7].copy_from_slice(&self.min_frame_size.to_be_bytes()[1..]);
        raw[7..10].copy_from_slice(&self.max_frame_size.to_be_bytes()[1..]);

        // sample rate(20) | channels-1(3) | bps-1(5) | total samples(36)
        let mut packed = 0u64;
        packed = bits::write_bit_range_u64(packed, 44, 64, self.sample_rate as u64);
        packed = bits::write_bit_range_u64(packed, 41, 44, self.channels.saturating_sub(1) as u64);
        packed = bits::write_bit_range_u64(packed, 36, 41, self.bits_per_sample.saturating_sub(1) as u64);
        packed = bits::write_bit_range_u64(packed, 0, 36, self.total_samples);
        raw[10..18].copy_from_slice(&packed.to_be_bytes());

        raw[18..34].copy_from_slice(&self.md5);
        raw
    }
}
