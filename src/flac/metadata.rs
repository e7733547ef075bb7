//! Metadata block chain.
//!
//! Each block starts with a 4-byte header: one byte holding the last-block
//! flag (top bit) and the block type (low seven bits), then a 24-bit
//! big-endian payload length.  The chain begins right after the magic and ends
//! with the block whose last flag is set; audio frames follow immediately.

use serde::Serialize;

use crate::flac::{FlacError, FIRST_BLOCK_OFFSET};
use crate::source::{ByteRange, ByteSource};

pub const BLOCK_HEADER_SIZE: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MetadataBlockType {
    StreamInfo,
    Padding,
    Application,
    SeekTable,
    VorbisComment,
    CueSheet,
    Picture,
    Reserved(u8),
}

impl MetadataBlockType {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::StreamInfo,
            1 => Self::Padding,
            2 => Self::Application,
            3 => Self::SeekTable,
            4 => Self::VorbisComment,
            5 => Self::CueSheet,
            6 => Self::Picture,
            n => Self::Reserved(n),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::StreamInfo    => 0,
            Self::Padding       => 1,
            Self::Application   => 2,
            Self::SeekTable     => 3,
            Self::VorbisComment => 4,
            Self::CueSheet      => 5,
            Self::Picture       => 6,
            Self::Reserved(n)   => n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetadataBlock {
    pub block_type:  MetadataBlockType,
    pub is_last:     bool,
    /// Absolute offset of the payload (just past the 4-byte header).
    pub byte_offset: u64,
    pub length:      u32,
}

impl MetadataBlock {
    pub fn end(&self) -> u64 {
        self.byte_offset + self.length as u64
    }

    pub fn payload(&self) -> ByteRange {
        ByteRange::new(self.byte_offset, self.end())
    }
}

/// Lazy iterator over the metadata chain.  Stops after the last block or the
/// first error.
pub struct MetadataWalker<'a, S: ByteSource + ?Sized> {
    source: &'a mut S,
    offset: u64,
    done:   bool,
}

impl<'a, S: ByteSource + ?Sized> MetadataWalker<'a, S> {
    pub fn new(source: &'a mut S) -> Self {
        Self { source, offset: FIRST_BLOCK_OFFSET, done: false }
    }

    fn read_block(&mut self) -> Result<MetadataBlock, FlacError> {
        let landed = self.source.seek_to(self.offset)?;
        if landed != self.offset {
            return Err(FlacError::InvalidOffset(self.offset));
        }

        let mut header = [0u8; BLOCK_HEADER_SIZE as usize];
        if self.source.read_sequential(&mut header)? < header.len() {
            return Err(FlacError::BadMetadataSeek);
        }

        let block = MetadataBlock {
            block_type:  MetadataBlockType::from_code(header[0] & 0x7F),
            is_last:     header[0] & 0x80 != 0,
            byte_offset: self.offset + BLOCK_HEADER_SIZE,
            length:      u32::from_be_bytes([0, header[1], header[2], header[3]]),
        };
        self.offset = block.end();
        Ok(block)
    }
}

impl<S: ByteSource + ?Sized> Iterator for MetadataWalker<'_, S> {
    type Item = Result<MetadataBlock, FlacError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.read_block();
        self.done = match &result {
            Ok(block) => block.is_last,
            Err(_)    => true,
        };
        Some(result)
    }
}

/// Collect the whole chain.
pub fn read_metadata_blocks<S: ByteSource + ?Sized>(source: &mut S) -> Result<Vec<MetadataBlock>, FlacError> {
    MetadataWalker::new(source).collect()
}

/// Offset of the first audio frame: the end of the last metadata block.
pub fn find_frame_start<S: ByteSource + ?Sized>(source: &mut S) -> Result<u64, FlacError> {
    let mut last = None;
    for block in MetadataWalker::new(source) {
        last = Some(block?);
    }
    let last = last.ok_or(FlacError::BadMetadataSeek)?;
    debug_assert!(last.is_last, "metadata walk ended on a block without the last flag");
    Ok(last.end())
}

/// Payload range of the first block of `block_type`.
pub fn scan_for_chunk<S: ByteSource + ?Sized>(
    source:     &mut S,
    block_type: MetadataBlockType,
) -> Result<ByteRange, FlacError> {
    for block in MetadataWalker::new(source) {
        let block = block?;
        if block.block_type == block_type {
            return Ok(block.payload());
        }
    }
    Err(FlacError::ChunkNotFound(block_type.code()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn chain() -> Vec<u8> {
        let mut bytes = b"fLaC".to_vec();
        bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x22]);
        bytes.extend_from_slice(&[0u8; 34]);
        bytes.extend_from_slice(&[0x04, 0x00, 0x00, 0x08]);
        bytes.extend_from_slice(&[0u8; 8]);
        bytes.extend_from_slice(&[0x81, 0x00, 0x00, 0x02]);
        bytes.extend_from_slice(&[0u8; 2]);
        bytes.extend_from_slice(&[0xFF, 0xF8]);
        bytes
    }

    #[test]
    fn walks_every_block() {
        let mut src = Cursor::new(chain());
        let blocks = read_metadata_blocks(&mut src).unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].block_type, MetadataBlockType::StreamInfo);
        assert_eq!(blocks[0].byte_offset, 8);
        assert_eq!(blocks[1].block_type, MetadataBlockType::VorbisComment);
        assert_eq!(blocks[1].payload(), ByteRange::new(46, 54));
        assert_eq!(blocks[2].block_type, MetadataBlockType::Padding);
        assert!(blocks[2].is_last);
        assert_eq!(find_frame_start(&mut src).unwrap(), 60);
    }

    #[test]
    fn scan_for_chunk_reports_missing_type() {
        let mut src = Cursor::new(chain());
        assert_eq!(scan_for_chunk(&mut src, MetadataBlockType::VorbisComment).unwrap().start, 46);
        let err = scan_for_chunk(&mut src, MetadataBlockType::Picture).unwrap_err();
        assert_eq!(err.to_string(), "Chunk with ID `6` was not found");
    }

    #[test]
    fn truncated_chain_is_bad_metadata_seek() {
        let mut bytes = chain();
        bytes.truncate(56);
        let mut src = Cursor::new(bytes);
        let results: Vec<_> = MetadataWalker::new(&mut src).collect();
        assert_eq!(results.len(), 3);
        assert!(matches!(results[2], Err(FlacError::BadMetadataSeek)));
    }
}
