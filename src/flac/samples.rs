//! Sample-count reconciliation.
//!
//! STREAMINFO's total-samples field is written by the recorder and can be
//! wrong.  The true count follows from the last two frames of the stream: with
//! fixed blocking every frame but the last holds `block_size` samples, so
//! `(penultimate.frame_number + 1) * block_size + last.block_size`.
//!
//! Finding those frames normally only needs the tail of the file; the scan
//! starts three maximum-size frames before the end.  A full scan from the first
//! frame is available for files whose tail cannot be trusted.

use tracing::debug;

use crate::flac::frame::BlockingStrategy;
use crate::flac::metadata::find_frame_start;
use crate::flac::scanner::{Frame, FrameScanner, ScanOptions};
use crate::flac::streaminfo::{read_max_block_size, read_max_frame_size, read_min_block_size};
use crate::flac::FlacError;
use crate::source::ByteSource;

/// Frame-size estimate used when STREAMINFO leaves the maximum frame size unset.
pub const DEFAULT_LARGEST_FRAME: u64 = 32_768 * 2;

/// How many maximum-size frames before the end the tail scan starts.
pub const TAIL_SCAN_FRAMES: u64 = 3;

/// Where a tail scan starts: `TAIL_SCAN_FRAMES` frames before the end, but
/// never before the first frame.
pub fn tail_scan_offset<S: ByteSource + ?Sized>(source: &mut S) -> Result<u64, FlacError> {
    let largest = match read_max_frame_size(source)? {
        0 => DEFAULT_LARGEST_FRAME,
        n => n as u64,
    };
    let frame_start = find_frame_start(source)?;
    let length = source.length()?;
    Ok(length.saturating_sub(TAIL_SCAN_FRAMES * largest).max(frame_start))
}

/// All frames from the tail scan offset, or from the first frame when
/// `full_scan` is set.
pub fn find_frames<S: ByteSource + ?Sized>(source: &mut S, full_scan: bool) -> Result<Vec<Frame>, FlacError> {
    let start_offset = if full_scan { None } else { Some(tail_scan_offset(source)?) };
    let options = ScanOptions { start_offset, ..ScanOptions::default() };
    let frames = FrameScanner::new(source, options)?.collect::<Result<Vec<_>, _>>()?;
    debug!(count = frames.len(), full_scan, "found frames");
    Ok(frames)
}

/// Total samples implied by the last two frames of `frames`.
pub fn calculate_sample_count_from_frame_list(frames: &[Frame]) -> Result<u64, FlacError> {
    let [.., penultimate, ultimate] = frames else {
        return Err(FlacError::CountSamplesNotEnoughFrames);
    };

    match (penultimate.header.blocking_strategy, ultimate.header.blocking_strategy) {
        (BlockingStrategy::Fixed, BlockingStrategy::Fixed) => {
            let number = penultimate.header.frame_number.ok_or(FlacError::CountSamplesNotFixed)? as u64;
            Ok((number + 1) * penultimate.header.block_size as u64 + ultimate.header.block_size as u64)
        }
        (BlockingStrategy::Variable, BlockingStrategy::Variable) => {
            let start = ultimate.header.starting_sample.ok_or(FlacError::CountSamplesNotFixed)?;
            Ok(start + ultimate.header.block_size as u64)
        }
        _ => Err(FlacError::CountSamplesNotFixed),
    }
}

/// Count the samples actually present in the stream.
///
/// Only fixed block-size streams can be counted.
pub fn count_samples<S: ByteSource + ?Sized>(source: &mut S, full_scan: bool) -> Result<u64, FlacError> {
    let min = read_min_block_size(source)?;
    let max = read_max_block_size(source)?;
    if min != max {
        return Err(FlacError::CountSamplesBlockSize);
    }

    let frames = find_frames(source, full_scan)?;
    calculate_sample_count_from_frame_list(&frames)
}
