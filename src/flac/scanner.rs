//! Frame resynchronisation scanner.
//!
//! # How it works
//!
//! The scanner pulls the frame region through a growable window.  Bytes in
//! the window are either *consumed* (the scanner is done with them) or merely
//! *examined*; a refill keeps the examined-but-unconsumed tail and appends
//! fresh input behind it, so a sync code or header split across two reads is
//! seen whole on the next pass.  The output is therefore independent of the
//! read size.
//!
//! ## States
//!
//! | State | Action |
//! |-------|--------|
//! | `Seeking`   | skip to the next `0xFF` |
//! | `Candidate` | peek the second byte: `0xF8`/`0xF9` decode, `0xFF` re-seek one byte on, else skip two |
//! | `Decoding`  | decode 16 bytes, check CRC and continuity; emit, or skip two bytes |
//!
//! Any state that needs more bytes than the window holds asks for input
//! without consuming anything.  At end of input the scan finishes; a
//! candidate with fewer than 16 bytes behind it is never decoded.
//!
//! ## Continuity
//!
//! A CRC-valid header can still be a coincidence inside subframe data.  Each
//! decoded header must therefore follow the previously emitted one: fixed
//! blocking needs the next frame number, variable blocking a starting sample
//! that does not go backwards.  Headers that break continuity are skipped
//! like any other rejected candidate.

use std::io;

use serde::Serialize;
use tracing::trace;

use crate::flac::frame::{
    BlockingStrategy, FrameHeader, FRAME_HEADER_MAX_SIZE, SYNC_BYTE_ONE, SYNC_BYTE_TWO_FIXED,
    SYNC_BYTE_TWO_VARIABLE,
};
use crate::flac::metadata::find_frame_start;
use crate::flac::streaminfo::{read_bit_depth, read_sample_rate};
use crate::flac::FlacError;
use crate::source::ByteSource;

/// Default number of bytes pulled from the source per refill.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Bytes skipped after a rejected candidate.
const DESYNC_SKIP: usize = 2;

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Frame {
    /// Frame number of the first frame seen, counting up from there.
    pub index:       u32,
    /// Absolute offset of the frame's first sync byte.
    pub byte_offset: u64,
    pub header:      FrameHeader,
}

#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    /// Bytes requested from the source per refill.
    pub buffer_size:  usize,
    /// Where to start scanning.  `None` starts at the first frame.
    pub start_offset: Option<u64>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self { buffer_size: DEFAULT_BUFFER_SIZE, start_offset: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Seeking,
    Candidate,
    Decoding,
}

enum Step {
    Emit(Frame),
    Continue,
    NeedInput,
}

// ── Window ────────────────────────────────────────────────────────────────────

/// Growable window over the source.  `data[..consumed]` is spent;
/// `data[consumed..]` has been read but not yet consumed.
struct Window {
    data:     Vec<u8>,
    consumed: usize,
    /// Absolute offset of `data[0]`.
    origin:   u64,
}

impl Window {
    fn pending(&self) -> &[u8] {
        &self.data[self.consumed..]
    }

    fn position(&self) -> u64 {
        self.origin + self.consumed as u64
    }

    fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.data.len() - self.consumed);
        self.consumed += n;
    }

    /// Drop the spent prefix and append up to `chunk` fresh bytes.
    fn refill<S: ByteSource + ?Sized>(&mut self, source: &mut S, chunk: usize) -> io::Result<usize> {
        self.data.drain(..self.consumed);
        self.origin += self.consumed as u64;
        self.consumed = 0;

        let have = self.data.len();
        self.data.resize(have + chunk, 0);
        let read = source.read_at(self.origin + have as u64, &mut self.data[have..])?;
        self.data.truncate(have + read);
        Ok(read)
    }
}

// ── Scanner ───────────────────────────────────────────────────────────────────

/// Lazy, finite iterator over the frames of a FLAC stream.
///
/// Yields `Err` only for I/O failures, after which it is exhausted.  Scanning
/// the same source again from the same offset reproduces the same frames.
pub struct FrameScanner<'a, S: ByteSource + ?Sized> {
    source:                 &'a mut S,
    window:                 Window,
    chunk:                  usize,
    stream_sample_rate:     u32,
    stream_bits_per_sample: u8,
    state:                  ScanState,
    last:                   Option<FrameHeader>,
    index:                  Option<u32>,
    eof:                    bool,
    finished:               bool,
}

impl<'a, S: ByteSource + ?Sized> FrameScanner<'a, S> {
    pub fn new(source: &'a mut S, options: ScanOptions) -> Result<Self, FlacError> {
        Self::with_buffer(source, options, Vec::new())
    }

    /// Scan using `buffer` as backing storage.  Recover it with
    /// [`into_buffer`](Self::into_buffer).
    pub fn with_buffer(source: &'a mut S, options: ScanOptions, mut buffer: Vec<u8>) -> Result<Self, FlacError> {
        let stream_sample_rate = read_sample_rate(source)?;
        let stream_bits_per_sample = read_bit_depth(source)?;

        let start = match options.start_offset {
            Some(offset) => offset,
            None => find_frame_start(source)?,
        };
        if start > source.length()? || source.seek_to(start)? != start {
            return Err(FlacError::BadFrameSeek(start));
        }

        buffer.clear();
        Ok(Self {
            source,
            window: Window { data: buffer, consumed: 0, origin: start },
            chunk: options.buffer_size.max(1),
            stream_sample_rate,
            stream_bits_per_sample,
            state: ScanState::Seeking,
            last: None,
            index: None,
            eof: false,
            finished: false,
        })
    }

    /// Absolute offset of the first unconsumed byte.
    pub fn position(&self) -> u64 {
        self.window.position()
    }

    pub fn into_buffer(self) -> Vec<u8> {
        let mut data = self.window.data;
        data.clear();
        data
    }

    fn step(&mut self) -> Step {
        let pending = self.window.pending();
        match self.state {
            ScanState::Seeking => match pending.iter().position(|&b| b == SYNC_BYTE_ONE) {
                Some(i) => {
                    self.window.consume(i);
                    self.state = ScanState::Candidate;
                    Step::Continue
                }
                None => {
                    let n = pending.len();
                    self.window.consume(n);
                    Step::NeedInput
                }
            },

            ScanState::Candidate => {
                if pending.len() < 2 {
                    return Step::NeedInput;
                }
                let second = pending[1];
                match second {
                    SYNC_BYTE_TWO_FIXED | SYNC_BYTE_TWO_VARIABLE => {
                        self.state = ScanState::Decoding;
                    }
                    SYNC_BYTE_ONE => {
                        self.window.consume(1);
                        self.state = ScanState::Seeking;
                    }
                    _ => {
                        self.window.consume(DESYNC_SKIP);
                        self.state = ScanState::Seeking;
                    }
                }
                Step::Continue
            }

            ScanState::Decoding => {
                if pending.len() < FRAME_HEADER_MAX_SIZE {
                    return Step::NeedInput;
                }
                let offset = self.window.position();
                let decoded = FrameHeader::decode(
                    &pending[..FRAME_HEADER_MAX_SIZE],
                    self.stream_sample_rate,
                    self.stream_bits_per_sample,
                );
                self.state = ScanState::Seeking;

                let (header, consumed) = match decoded {
                    Ok(ok) => ok,
                    Err(e) => {
                        trace!(offset, error = %e, "rejected frame candidate");
                        self.window.consume(DESYNC_SKIP);
                        return Step::Continue;
                    }
                };
                if let Some(last) = &self.last {
                    if let Err(e) = check_continuity(last, &header) {
                        trace!(offset, error = %e, "rejected discontinuous frame");
                        self.window.consume(DESYNC_SKIP);
                        return Step::Continue;
                    }
                }

                let index = match self.index {
                    None    => header.frame_number.unwrap_or(0),
                    Some(i) => i.saturating_add(1),
                };
                self.index = Some(index);
                self.last = Some(header);
                self.window.consume(consumed);
                Step::Emit(Frame { index, byte_offset: offset, header })
            }
        }
    }
}

impl<S: ByteSource + ?Sized> Iterator for FrameScanner<'_, S> {
    type Item = Result<Frame, FlacError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            match self.step() {
                Step::Emit(frame) => return Some(Ok(frame)),
                Step::Continue => {}
                Step::NeedInput if self.eof => self.finished = true,
                Step::NeedInput => match self.window.refill(&mut *self.source, self.chunk) {
                    Ok(0) => self.eof = true,
                    Ok(_) => {}
                    Err(e) => {
                        self.finished = true;
                        return Some(Err(e.into()));
                    }
                },
            }
        }
        None
    }
}

/// Whether `next` may directly follow `last` in a stream.
pub fn check_continuity(last: &FrameHeader, next: &FrameHeader) -> Result<(), FlacError> {
    match (last.blocking_strategy, next.blocking_strategy) {
        (BlockingStrategy::Fixed, BlockingStrategy::Fixed) => {
            let expected = last.frame_number.map(|n| n.saturating_add(1));
            if next.frame_number != expected {
                return Err(FlacError::CountSamplesNotConsecutive);
            }
        }
        (BlockingStrategy::Variable, BlockingStrategy::Variable) => {
            if next.starting_sample < last.starting_sample {
                return Err(FlacError::CountSamplesNotConsecutive);
            }
        }
        _ => return Err(FlacError::CountSamplesNotFixed),
    }
    Ok(())
}
