//! RIFF/WAVE chunk reader.
//!
//! Only the container structure is interpreted: the RIFF header, the `WAVE`
//! form type and the flat list of sub-chunks behind it.  Every chunk is
//! reported as the absolute range of its payload, i.e. just past its 8-byte
//! id/length header.
//!
//! Some recorder firmware writes chunk lengths that run past the end of the
//! file.  Lookups reject those unless `allow_out_of_bounds` is set, which the
//! length-repair fixes need to see the bad value at all.

use std::io;

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;
use thiserror::Error;

use crate::source::{ByteRange, ByteSource};

pub const RIFF_MAGIC:   &[u8; 4] = b"RIFF";
pub const WAVE_MAGIC:   &[u8; 4] = b"WAVE";
pub const FORMAT_CHUNK: &[u8; 4] = b"fmt ";
pub const DATA_CHUNK:   &[u8; 4] = b"data";

/// Offset of the RIFF chunk length field.
pub const RIFF_LENGTH_OFFSET: u64 = 4;
/// `RIFF` + length.  Not counted in the RIFF length itself.
pub const MINIMUM_RIFF_HEADER_LENGTH: u64 = 8;

const CHUNK_ID_LENGTH:     u64 = 4;
const CHUNK_HEADER_LENGTH: u64 = 8;
const FORMAT_CHUNK_MIN:    u64 = 16;

/// `wFormatTag` of uncompressed integer PCM.
pub const FORMAT_PCM: u16 = 1;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum WaveError {
    #[error("Error reading file: file is not long enough to have RIFF/WAVE header")]
    FileTooShortRiff,
    #[error("Error reading file: no valid file data was found")]
    InvalidFileData,
    #[error("Cannot process a non-WAVE RIFF file.")]
    NotWave,
    #[error("Error reading file: an invalid offset was found")]
    InvalidOffset,
    #[error("Error reading chunk: chunk size exceeds file size")]
    InvalidChunk,
    #[error("Error reading file: file is not long enough to have a {0} header")]
    FileTooShort(String),
    #[error("Error reading file: a {0} chunk was not found")]
    ChunkNotFound(String),
    #[error("Chunk length {0} does not fit in 32 bits")]
    LengthOverflow(u64),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn chunk_name(id: &[u8; 4]) -> String {
    String::from_utf8_lossy(id).into_owned()
}

// ── Types ─────────────────────────────────────────────────────────────────────

/// Fields of the `fmt ` chunk shared by every format tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WaveFormat {
    pub audio_format:    u16,
    pub channels:        u16,
    pub sample_rate:     u32,
    pub byte_rate:       u32,
    pub block_align:     u16,
    pub bits_per_sample: u16,
}

impl WaveFormat {
    pub fn parse(payload: &[u8]) -> Result<Self, WaveError> {
        if (payload.len() as u64) < FORMAT_CHUNK_MIN {
            return Err(WaveError::FileTooShort(chunk_name(FORMAT_CHUNK)));
        }
        Ok(Self {
            audio_format:    LittleEndian::read_u16(&payload[0..]),
            channels:        LittleEndian::read_u16(&payload[2..]),
            sample_rate:     LittleEndian::read_u32(&payload[4..]),
            byte_rate:       LittleEndian::read_u32(&payload[8..]),
            block_align:     LittleEndian::read_u16(&payload[12..]),
            bits_per_sample: LittleEndian::read_u16(&payload[14..]),
        })
    }

    /// Sample frames in a data chunk of `data_length` bytes.
    pub fn total_samples(&self, data_length: u64) -> u64 {
        let frame_bytes = self.channels as u64 * (self.bits_per_sample as u64 / 8);
        if frame_bytes == 0 {
            return 0;
        }
        data_length / frame_bytes
    }
}

// ── Chunk lookup ──────────────────────────────────────────────────────────────

/// The RIFF chunk: everything after the 8-byte header, as far as the declared
/// length says.  The end may lie past the end of the file.
pub fn find_riff_chunk<S: ByteSource + ?Sized>(source: &mut S) -> Result<ByteRange, WaveError> {
    if source.length()? < MINIMUM_RIFF_HEADER_LENGTH {
        return Err(WaveError::FileTooShortRiff);
    }

    let mut header = [0u8; MINIMUM_RIFF_HEADER_LENGTH as usize];
    if source.read_at(0, &mut header)? != header.len() {
        return Err(WaveError::FileTooShortRiff);
    }
    if &header[..4] != RIFF_MAGIC {
        return Err(WaveError::InvalidFileData);
    }

    let length = LittleEndian::read_u32(&header[4..]) as u64;
    Ok(ByteRange::new(MINIMUM_RIFF_HEADER_LENGTH, MINIMUM_RIFF_HEADER_LENGTH + length))
}

/// The `WAVE` form: the RIFF chunk minus its 4-byte form type.
pub fn find_wave_chunk<S: ByteSource + ?Sized>(source: &mut S, riff: ByteRange) -> Result<ByteRange, WaveError> {
    if riff.len() < CHUNK_ID_LENGTH {
        return Err(WaveError::FileTooShortRiff);
    }

    let mut form = [0u8; CHUNK_ID_LENGTH as usize];
    if source.read_at(riff.start, &mut form)? != form.len() {
        return Err(WaveError::FileTooShortRiff);
    }
    if &form != WAVE_MAGIC {
        return Err(WaveError::NotWave);
    }

    Ok(ByteRange::new(riff.start + CHUNK_ID_LENGTH, riff.end))
}

pub fn find_format_chunk<S: ByteSource + ?Sized>(
    source: &mut S,
    wave:   ByteRange,
    allow_out_of_bounds: bool,
) -> Result<ByteRange, WaveError> {
    scan_for_chunk(source, wave, FORMAT_CHUNK, allow_out_of_bounds)
}

pub fn find_data_chunk<S: ByteSource + ?Sized>(
    source: &mut S,
    wave:   ByteRange,
    allow_out_of_bounds: bool,
) -> Result<ByteRange, WaveError> {
    scan_for_chunk(source, wave, DATA_CHUNK, allow_out_of_bounds)
}

/// Walk the sibling chunks of `container` looking for `target`.
///
/// The container end is not checked against the file length; a RIFF length
/// that overshoots is one of the faults this reader has to tolerate.
pub fn scan_for_chunk<S: ByteSource + ?Sized>(
    source:    &mut S,
    container: ByteRange,
    target:    &[u8; 4],
    allow_out_of_bounds: bool,
) -> Result<ByteRange, WaveError> {
    let length = source.length()?;
    if length < container.start + CHUNK_HEADER_LENGTH {
        return Err(WaveError::FileTooShort(chunk_name(target)));
    }

    let mut offset = container.start;
    let mut header = [0u8; CHUNK_HEADER_LENGTH as usize];
    while offset < container.end {
        if source.seek_to(offset)? != offset {
            return Err(WaveError::InvalidOffset);
        }
        if source.read_sequential(&mut header)? != header.len() {
            return Err(WaveError::ChunkNotFound(chunk_name(target)));
        }
        offset += CHUNK_HEADER_LENGTH;

        let chunk_length = LittleEndian::read_u32(&header[4..]) as u64;
        if offset + chunk_length > length && !allow_out_of_bounds {
            return Err(WaveError::InvalidChunk);
        }
        if &header[..4] == target {
            return Ok(ByteRange::new(offset, offset + chunk_length));
        }
        // odd-length chunks carry one pad byte
        offset += chunk_length + (chunk_length & 1);
    }

    Err(WaveError::ChunkNotFound(chunk_name(target)))
}

// ── Convenience ───────────────────────────────────────────────────────────────

pub fn is_wave<S: ByteSource + ?Sized>(source: &mut S) -> bool {
    find_riff_chunk(source).and_then(|riff| find_wave_chunk(source, riff)).is_ok()
}

pub fn read_format<S: ByteSource + ?Sized>(source: &mut S) -> Result<WaveFormat, WaveError> {
    let riff = find_riff_chunk(source)?;
    let wave = find_wave_chunk(source, riff)?;
    let format = find_format_chunk(source, wave, false)?;
    WaveFormat::parse(&source.read_range(format)?)
}

/// Whether the source is a RIFF/WAVE file holding integer PCM.
pub fn is_pcm_wave<S: ByteSource + ?Sized>(source: &mut S) -> Result<bool, WaveError> {
    Ok(read_format(source)?.audio_format == FORMAT_PCM)
}
