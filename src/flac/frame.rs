//! Frame header codec.
//!
//! ```text
//! byte 0    1111 1111                      sync (14 bits) ...
//! byte 1    1111 10 r s                    ... sync, reserved, blocking strategy
//! byte 2    bbbb rrrr                      block-size code, sample-rate code
//! byte 3    cccc ddd r                     channel code, bit-depth code, reserved
//! 1-6 B     frame number / sample number   "UTF-8" varint
//! 0-2 B     block size tail                codes 0110 / 0111
//! 0-2 B     sample rate tail               codes 1100 / 1101 / 1110
//! 1 B       CRC-8 of everything above
//! ```
//!
//! A header never exceeds [`FRAME_HEADER_MAX_SIZE`] bytes, so the decoder is
//! always handed exactly that many and reports how many it actually used.

use serde::Serialize;
use thiserror::Error;

use crate::flac::crc::crc8;
use crate::flac::varint::{self, VarintError};

pub const SYNC_CODE: u16 = 0b11_1111_1111_1110;
pub const SYNC_BYTE_ONE: u8 = 0xFF;
pub const SYNC_BYTE_TWO_FIXED: u8 = 0xF8;
pub const SYNC_BYTE_TWO_VARIABLE: u8 = 0xF9;
pub const FRAME_HEADER_MAX_SIZE: usize = 16;

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockingStrategy {
    Fixed,
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChannelAssignment {
    Mono,
    LeftRight,
    LeftRightCenter,
    /// FL FR BL BR
    Quad,
    /// FL FR FC BL BR
    FivePointZero,
    /// FL FR FC LFE BL BR
    FivePointOne,
    /// FL FR FC LFE BC SL SR
    SixPointOne,
    /// FL FR FC LFE BL BR SL SR
    SevenPointOne,
    /// Left channel plus side (difference) channel.
    LeftSide,
    /// Side channel plus right channel.
    RightSide,
    /// Mid (average) plus side channel.
    MidSide,
}

impl ChannelAssignment {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0  => Self::Mono,
            1  => Self::LeftRight,
            2  => Self::LeftRightCenter,
            3  => Self::Quad,
            4  => Self::FivePointZero,
            5  => Self::FivePointOne,
            6  => Self::SixPointOne,
            7  => Self::SevenPointOne,
            8  => Self::LeftSide,
            9  => Self::RightSide,
            10 => Self::MidSide,
            _  => return None,
        })
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Mono            => 0,
            Self::LeftRight       => 1,
            Self::LeftRightCenter => 2,
            Self::Quad            => 3,
            Self::FivePointZero   => 4,
            Self::FivePointOne    => 5,
            Self::SixPointOne     => 6,
            Self::SevenPointOne   => 7,
            Self::LeftSide        => 8,
            Self::RightSide       => 9,
            Self::MidSide         => 10,
        }
    }

    pub fn channels(self) -> u8 {
        match self {
            Self::LeftSide | Self::RightSide | Self::MidSide => 2,
            other => other.code() + 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameHeader {
    pub blocking_strategy:  BlockingStrategy,
    pub block_size:         u32,
    pub sample_rate:        u32,
    pub channel_assignment: ChannelAssignment,
    pub bits_per_sample:    u8,
    /// Present for fixed blocking only.
    pub frame_number:       Option<u32>,
    /// Present for variable blocking only.
    pub starting_sample:    Option<u64>,
    pub crc8:               u8,
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderErrorKind {
    #[error("Invalid Frame Header: Sync code not found at start of span")]
    BadSyncCode,
    #[error("Invalid Frame Header: Block size 0 is reserved")]
    BadFrameBlockSize0,
    #[error("Invalid Frame Header: Sample rate 15 is invalid")]
    BadFrameSampleRate,
    #[error("Invalid Frame Header: Bit depth is reserved")]
    BadFrameBitDepth,
    #[error("Invalid Frame Header: channel assignment is reserved")]
    BadFrameChannelAssignment,
    #[error("Invalid Frame Header: UTF-8 coded number cannot be read")]
    BadUTF8Number(VarintError),
    #[error("Invalid Frame Header: CRC8 did not match. Calculated 0x{calculated:X}, Embedded 0x{embedded:X}")]
    BadCrc { calculated: u8, embedded: u8 },
}

/// A rejected header, with the number of bytes examined before rejection.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{kind}")]
pub struct HeaderError {
    pub kind:     HeaderErrorKind,
    pub consumed: usize,
}

impl HeaderErrorKind {
    fn at(self, consumed: usize) -> HeaderError {
        HeaderError { kind: self, consumed }
    }
}

// ── Decode ────────────────────────────────────────────────────────────────────

const SAMPLE_RATES: [u32; 12] = [
    0, 88_200, 176_400, 192_000, 8_000, 16_000, 22_050, 24_000, 32_000, 44_100, 48_000, 96_000,
];

const BIT_DEPTHS: [Option<u8>; 8] = [None, Some(8), Some(12), None, Some(16), Some(20), Some(24), None];

impl FrameHeader {
    /// Decode a header from the front of `bytes`.
    ///
    /// `stream_sample_rate` and `stream_bits_per_sample` come from STREAMINFO
    /// and are used when the header defers to them.  Returns the header and
    /// the number of bytes it occupies, CRC included.
    ///
    /// # Panics
    /// If `bytes` is shorter than [`FRAME_HEADER_MAX_SIZE`].
    pub fn decode(
        bytes:                  &[u8],
        stream_sample_rate:     u32,
        stream_bits_per_sample: u8,
    ) -> Result<(Self, usize), HeaderError> {
        assert!(
            bytes.len() >= FRAME_HEADER_MAX_SIZE,
            "frame header decode needs {FRAME_HEADER_MAX_SIZE} bytes, got {}",
            bytes.len()
        );

        let sync = ((bytes[0] as u16) << 8 | (bytes[1] & 0xFC) as u16) >> 2;
        if sync != SYNC_CODE {
            return Err(HeaderErrorKind::BadSyncCode.at(2));
        }
        let blocking_strategy = if bytes[1] & 0x01 == 0 {
            BlockingStrategy::Fixed
        } else {
            BlockingStrategy::Variable
        };

        let block_size_code  = bytes[2] >> 4;
        let sample_rate_code = bytes[2] & 0x0F;
        let channel_code     = bytes[3] >> 4;
        let bit_depth_code   = (bytes[3] & 0x0E) >> 1;
        let mut consumed = 4;

        let channel_assignment = ChannelAssignment::from_code(channel_code)
            .ok_or(HeaderErrorKind::BadFrameChannelAssignment.at(consumed))?;

        let bits_per_sample = match bit_depth_code {
            0 => stream_bits_per_sample,
            n => BIT_DEPTHS[n as usize].ok_or(HeaderErrorKind::BadFrameBitDepth.at(consumed))?,
        };

        let (number, width) = varint::decode(&bytes[consumed..])
            .map_err(|e| HeaderErrorKind::BadUTF8Number(e).at(consumed))?;
        consumed += width;

        let block_size = match block_size_code {
            0 => return Err(HeaderErrorKind::BadFrameBlockSize0.at(consumed)),
            1 => 192,
            n @ 2..=5 => 576 << (n - 2),
            6 => {
                consumed += 1;
                bytes[consumed - 1] as u32 + 1
            }
            7 => {
                consumed += 2;
                u16::from_be_bytes([bytes[consumed - 2], bytes[consumed - 1]]) as u32 + 1
            }
            n => 256 << (n - 8),
        };

        let sample_rate = match sample_rate_code {
            0 => stream_sample_rate,
            n @ 1..=11 => SAMPLE_RATES[n as usize],
            12 => {
                consumed += 1;
                bytes[consumed - 1] as u32 * 1000
            }
            13 => {
                consumed += 2;
                u16::from_be_bytes([bytes[consumed - 2], bytes[consumed - 1]]) as u32
            }
            14 => {
                consumed += 2;
                u16::from_be_bytes([bytes[consumed - 2], bytes[consumed - 1]]) as u32 * 10
            }
            _ => return Err(HeaderErrorKind::BadFrameSampleRate.at(consumed)),
        };

        let calculated = crc8(&bytes[..consumed]);
        let embedded = bytes[consumed];
        consumed += 1;
        if calculated != embedded {
            return Err(HeaderErrorKind::BadCrc { calculated, embedded }.at(consumed));
        }

        let (frame_number, starting_sample) = match blocking_strategy {
            BlockingStrategy::Fixed    => (Some(number as u32), None),
            BlockingStrategy::Variable => (None, Some(number)),
        };

        Ok((
            Self {
                blocking_strategy,
                block_size,
                sample_rate,
                channel_assignment,
                bits_per_sample,
                frame_number,
                starting_sample,
                crc8: embedded,
            },
            consumed,
        ))
    }

    /// Encode this header, picking the shortest codes that represent it.
    ///
    /// A sample rate equal to `stream_sample_rate`, or bit depth equal to
    /// `stream_bits_per_sample`, is encoded as "defer to STREAMINFO" when no
    /// table code exists for it.  The stored `crc8` is ignored and recomputed.
    /// Returns `None` when a field cannot be represented.
    pub fn encode(&self, stream_sample_rate: u32, stream_bits_per_sample: u8) -> Option<Vec<u8>> {
        let number = match self.blocking_strategy {
            BlockingStrategy::Fixed    => self.frame_number? as u64,
            BlockingStrategy::Variable => self.starting_sample?,
        };

        let mut tail = Vec::new();
        let block_size_code: u8 = match self.block_size {
            192 => 1,
            576 => 2, 1152 => 3, 2304 => 4, 4608 => 5,
            256 => 8, 512 => 9, 1024 => 10, 2048 => 11,
            4096 => 12, 8192 => 13, 16384 => 14, 32768 => 15,
            n @ 1..=255 => {
                tail.push((n - 1) as u8);
                6
            }
            n @ 257..=65536 => {
                tail.extend_from_slice(&((n - 1) as u16).to_be_bytes());
                7
            }
            _ => return None,
        };

        let sample_rate_code: u8 = match SAMPLE_RATES.iter().skip(1).position(|&r| r == self.sample_rate) {
            Some(i) => i as u8 + 1,
            None if self.sample_rate == stream_sample_rate => 0,
            None if self.sample_rate % 1000 == 0 && self.sample_rate / 1000 <= 255 => {
                tail.push((self.sample_rate / 1000) as u8);
                12
            }
            None if self.sample_rate <= 0xFFFF => {
                tail.extend_from_slice(&(self.sample_rate as u16).to_be_bytes());
                13
            }
            None if self.sample_rate % 10 == 0 && self.sample_rate / 10 <= 0xFFFF => {
                tail.extend_from_slice(&((self.sample_rate / 10) as u16).to_be_bytes());
                14
            }
            None => return None,
        };

        let bit_depth_code: u8 = match BIT_DEPTHS.iter().position(|&b| b == Some(self.bits_per_sample)) {
            Some(i) => i as u8,
            None if self.bits_per_sample == stream_bits_per_sample => 0,
            None => return None,
        };

        let mut out = vec![
            SYNC_BYTE_ONE,
            match self.blocking_strategy {
                BlockingStrategy::Fixed    => SYNC_BYTE_TWO_FIXED,
                BlockingStrategy::Variable => SYNC_BYTE_TWO_VARIABLE,
            },
            block_size_code << 4 | sample_rate_code,
            self.channel_assignment.code() << 4 | bit_depth_code << 1,
        ];
        out.extend(varint::encode(number)?);
        out.extend(tail);
        out.push(crc8(&out));
        Some(out)
    }
}
