//! FLAC container inspection.
//!
//! # Layout
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0      | 4    | magic `fLaC` |
//! | 4      | 4    | first metadata block header (always STREAMINFO) |
//! | 8      | 34   | STREAMINFO payload, see [`streaminfo`] |
//! | 42     | ...  | further metadata blocks, see [`metadata`] |
//! | ...    | ...  | audio frames, see [`frame`] and [`scanner`] |
//!
//! Only metadata and frame headers are ever interpreted; subframe (audio
//! sample) data is treated as opaque bytes.

pub mod crc;
pub mod frame;
pub mod metadata;
pub mod samples;
pub mod scanner;
pub mod streaminfo;
pub mod varint;
pub mod vorbis;

use std::io;

use thiserror::Error;

use crate::source::ByteSource;

pub use frame::{BlockingStrategy, ChannelAssignment, FrameHeader, HeaderError, HeaderErrorKind};
pub use metadata::{
    find_frame_start, read_metadata_blocks, scan_for_chunk, MetadataBlock, MetadataBlockType, MetadataWalker,
};
pub use samples::{calculate_sample_count_from_frame_list, count_samples, find_frames};
pub use scanner::{Frame, FrameScanner, ScanOptions};
pub use streaminfo::StreamInfo;

pub const MAGIC: &[u8; 4] = b"fLaC";
pub const EXTENSION: &str = "flac";

/// Offset of the first metadata block header.
pub const FIRST_BLOCK_OFFSET: u64 = 4;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum FlacError {
    // structural
    #[error("Error reading file: file is not long enough to read metadata")]
    FileTooShort,
    #[error("Error reading file: file is not long enough to be a FLAC file")]
    FileTooShortFlac,
    #[error("Error reading file: could not seek to offset {0}")]
    InvalidOffset(u64),
    #[error("Could not seek to the next metadata block")]
    BadMetadataSeek,
    #[error("Could not seek to the frame offset {0}")]
    BadFrameSeek(u64),

    // semantic
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error("Total samples value {0} does not fit in 36 bits")]
    TotalSamplesTooLarge(u64),

    // consistency
    #[error("CountSamples only works on files that have a fixed block size")]
    CountSamplesBlockSize,
    #[error("Could not find enough frames to count samples for")]
    CountSamplesNotEnoughFrames,
    #[error("Found a mix of fixed and variable size frames; this is not allowed")]
    CountSamplesNotFixed,
    #[error("Found non-consecutive frame")]
    CountSamplesNotConsecutive,

    // policy
    #[error("Chunk with ID `{0}` was not found")]
    ChunkNotFound(u8),
    #[error("Invalid vorbis comment block: {0}")]
    BadVorbisComment(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Whether `source` starts with the FLAC magic followed by a STREAMINFO block.
pub fn is_flac<S: ByteSource + ?Sized>(source: &mut S) -> Result<bool, FlacError> {
    let mut magic = [0u8; 4];
    if source.read_at(0, &mut magic)? < magic.len() {
        return Err(FlacError::FileTooShortFlac);
    }
    if &magic != MAGIC {
        return Ok(false);
    }

    let mut header = [0u8; 4];
    if source.read_at(FIRST_BLOCK_OFFSET, &mut header)? < header.len() {
        return Ok(false);
    }
    let block_type = header[0] & 0x7F;
    let length = u32::from_be_bytes([0, header[1], header[2], header[3]]);

    Ok(block_type == MetadataBlockType::StreamInfo.code()
        && length >= streaminfo::STREAMINFO_PAYLOAD_LENGTH)
}
