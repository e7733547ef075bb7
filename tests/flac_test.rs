mod common;

use common::{FlacBuilder, FRAME_BODY};
use proptest::prelude::*;
use sensorfix::flac::scanner::DEFAULT_BUFFER_SIZE;
use sensorfix::flac::{
    calculate_sample_count_from_frame_list, count_samples, find_frame_start, find_frames, read_metadata_blocks,
    BlockingStrategy, FlacError, Frame, FrameHeader, FrameScanner, MetadataBlockType, ScanOptions, StreamInfo,
};
use sensorfix::frontier_labs::{read_firmware, read_recording_start};
use std::io::Cursor;

fn scan(bytes: &[u8], buffer_size: usize) -> Vec<Frame> {
    let mut src = Cursor::new(bytes.to_vec());
    let options = ScanOptions { buffer_size, start_offset: None };
    FrameScanner::new(&mut src, options).unwrap().collect::<Result<Vec<_>, _>>().unwrap()
}

fn numbers(frames: &[Frame]) -> Vec<u32> {
    frames.iter().map(|f| f.header.frame_number.unwrap()).collect()
}

/// A corrupt stretch between frames 3 and 4: an accidental sync pair with a
/// bad header, then a CRC-valid header that is out of sequence.
fn with_garbage() -> FlacBuilder {
    let base = FlacBuilder::default();
    let mut garbage = vec![0x13, 0x37, 0xFF, 0xF8, 0xC9, 0x08, 0x00, 0x77, 0x00, 0x00];
    garbage.extend(base.frame(99, 4096));
    garbage.extend([0xFF, 0xFF, 0xF9, 0x01]);
    garbage.resize(garbage.len() + 20, 0);
    FlacBuilder { garbage: Some((3, garbage)), ..base }
}

/// Metadata from the default builder followed by variable-blocking frames,
/// one per `(starting sample, block size)`.
fn variable_stream(frames: &[(u64, u32)]) -> Vec<u8> {
    let builder = FlacBuilder { frames: 0, total_samples: Some(0), ..FlacBuilder::default() };
    let mut out = builder.build();
    for &(start, block_size) in frames {
        let header = FrameHeader {
            blocking_strategy: BlockingStrategy::Variable,
            frame_number:      None,
            starting_sample:   Some(start),
            ..builder.header(0, block_size)
        };
        out.extend(header.encode(builder.sample_rate, builder.bits_per_sample).unwrap());
        out.resize(out.len() + FRAME_BODY, 0);
    }
    out
}

fn starting_samples(frames: &[Frame]) -> Vec<u64> {
    frames.iter().map(|f| f.header.starting_sample.unwrap()).collect()
}

#[test]
fn test_metadata_chain_of_built_file() {
    let bytes = FlacBuilder::default().build();
    let mut src = Cursor::new(bytes);

    let blocks = read_metadata_blocks(&mut src).unwrap();
    let types: Vec<_> = blocks.iter().map(|b| b.block_type).collect();
    assert_eq!(types, [MetadataBlockType::StreamInfo, MetadataBlockType::VorbisComment, MetadataBlockType::Padding]);
    assert!(blocks[2].is_last);
    assert_eq!(find_frame_start(&mut src).unwrap(), blocks[2].end());

    let info = StreamInfo::read(&mut src).unwrap();
    assert_eq!(info.sample_rate, 22_050);
    assert_eq!(info.total_samples, 7 * 4096 + 1000);

    let firmware = read_firmware(&mut src).unwrap();
    assert_eq!(firmware.version_text, "V3.20");
    assert!(firmware.tags.is_empty());
    assert_eq!(read_recording_start(&mut src).unwrap().to_filename_stamp(), "20200426T020000+1000");
}

#[test]
fn test_scan_finds_every_frame_in_order() {
    let builder = FlacBuilder::default();
    let bytes = builder.build();
    let frames = scan(&bytes, DEFAULT_BUFFER_SIZE);

    assert_eq!(numbers(&frames), (0..8).collect::<Vec<_>>());
    let start = find_frame_start(&mut Cursor::new(bytes.clone())).unwrap();
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame.index, i as u32);
        assert_eq!(frame.byte_offset, start + (i * builder.frame_length()) as u64);
    }
    assert_eq!(frames[7].header.block_size, 1000);
}

#[test]
fn test_scan_is_deterministic() {
    let bytes = with_garbage().build();
    assert_eq!(scan(&bytes, DEFAULT_BUFFER_SIZE), scan(&bytes, DEFAULT_BUFFER_SIZE));
}

#[test]
fn test_resync_skips_garbage_between_frames() {
    let builder = with_garbage();
    let bytes = builder.build();
    let frames = scan(&bytes, DEFAULT_BUFFER_SIZE);

    assert_eq!(numbers(&frames), (0..8).collect::<Vec<_>>());

    let garbage_len = builder.garbage.as_ref().unwrap().1.len() as u64;
    let gap = frames[4].byte_offset - frames[3].byte_offset;
    assert_eq!(gap, builder.frame_length() as u64 + garbage_len);
}

#[test]
fn test_scan_from_mid_stream_counts_from_first_frame_seen() {
    let builder = FlacBuilder { first_frame: 500, frames: 5, ..FlacBuilder::default() };
    let bytes = builder.build();
    let frames = scan(&bytes, 7);
    assert_eq!(frames.iter().map(|f| f.index).collect::<Vec<_>>(), [500, 501, 502, 503, 504]);
}

#[test]
fn test_sample_count_tail_and_full_scan_agree() {
    for (frames, last) in [(2u32, 1u32), (8, 1000), (40, 4096), (3, 17)] {
        let builder = FlacBuilder { frames, last_block_size: last, ..FlacBuilder::default() };
        let expected = (frames as u64 - 1) * 4096 + last as u64;
        let mut src = Cursor::new(builder.build());

        assert_eq!(count_samples(&mut src, false).unwrap(), expected, "tail scan, {frames} frames");
        assert_eq!(count_samples(&mut src, true).unwrap(), expected, "full scan, {frames} frames");
    }
}

#[test]
fn test_tail_scan_reads_only_the_end() {
    let builder = FlacBuilder { frames: 40, ..FlacBuilder::default() };
    let mut src = Cursor::new(builder.build());

    let tail = find_frames(&mut src, false).unwrap();
    let full = find_frames(&mut src, true).unwrap();
    assert_eq!(full.len(), 40);
    assert!(tail.len() >= 2 && tail.len() < 10, "tail scan found {}", tail.len());
    let (t, f) = (tail.last().unwrap(), full.last().unwrap());
    assert_eq!((t.byte_offset, t.header), (f.byte_offset, f.header));
    assert_eq!(
        calculate_sample_count_from_frame_list(&tail).unwrap(),
        calculate_sample_count_from_frame_list(&full).unwrap(),
    );
}

#[test]
fn test_count_rejects_variable_block_sizes() {
    let mut bytes = FlacBuilder::default().build();
    // min block size is the first STREAMINFO field, at offset 8
    bytes[8..10].copy_from_slice(&16u16.to_be_bytes());
    let err = count_samples(&mut Cursor::new(bytes), false).unwrap_err();
    assert_eq!(err.to_string(), "CountSamples only works on files that have a fixed block size");
}

#[test]
fn test_variable_blocking_skips_frames_that_go_backwards() {
    let bytes = variable_stream(&[
        (0, 4096),
        (4096, 4096),
        (8192, 4096),
        (1000, 4096),
        (12_288, 4096),
        (16_384, 1000),
    ]);

    for buffer_size in [DEFAULT_BUFFER_SIZE, 7] {
        let frames = scan(&bytes, buffer_size);
        assert_eq!(starting_samples(&frames), [0, 4096, 8192, 12_288, 16_384], "buffer {buffer_size}");
        assert_eq!(frames.iter().map(|f| f.index).collect::<Vec<_>>(), [0, 1, 2, 3, 4]);
        assert!(frames.iter().all(|f| f.header.blocking_strategy == BlockingStrategy::Variable));
        assert_eq!(calculate_sample_count_from_frame_list(&frames).unwrap(), 16_384 + 1000);
    }
}

#[test]
fn test_variable_blocking_allows_repeated_starting_sample() {
    let bytes = variable_stream(&[(0, 1152), (1152, 1152), (1152, 4608), (5760, 4608)]);
    assert_eq!(starting_samples(&scan(&bytes, DEFAULT_BUFFER_SIZE)), [0, 1152, 1152, 5760]);
}

#[test]
fn test_count_rejects_streams_declaring_mixed_block_sizes() {
    let mut bytes = variable_stream(&[(0, 1152), (1152, 4608), (5760, 4096)]);
    // STREAMINFO min and max block size, at offsets 8 and 10
    bytes[8..10].copy_from_slice(&1152u16.to_be_bytes());
    bytes[10..12].copy_from_slice(&4608u16.to_be_bytes());

    for full_scan in [false, true] {
        let err = count_samples(&mut Cursor::new(bytes.clone()), full_scan).unwrap_err();
        assert!(matches!(err, FlacError::CountSamplesBlockSize), "{err}");
    }
    // the frames themselves are fine
    assert_eq!(starting_samples(&scan(&bytes, DEFAULT_BUFFER_SIZE)), [0, 1152, 5760]);
}

#[test]
fn test_single_frame_is_not_enough() {
    let builder = FlacBuilder { frames: 1, ..FlacBuilder::default() };
    let err = count_samples(&mut Cursor::new(builder.build()), true).unwrap_err();
    assert_eq!(err.to_string(), "Could not find enough frames to count samples for");
}

#[test]
fn test_scanner_buffer_can_be_reused() {
    let bytes = FlacBuilder::default().build();
    let mut src = Cursor::new(bytes);

    let mut scanner = FrameScanner::new(&mut src, ScanOptions::default()).unwrap();
    let first: Vec<_> = scanner.by_ref().map(Result::unwrap).collect();
    let end = scanner.position();
    let buffer = scanner.into_buffer();
    assert!(buffer.is_empty());
    assert_eq!(end, src.get_ref().len() as u64);

    let again = FrameScanner::with_buffer(&mut src, ScanOptions::default(), buffer)
        .unwrap()
        .map(Result::unwrap)
        .collect::<Vec<_>>();
    assert_eq!(first, again);
}

proptest! {
    #[test]
    fn scan_is_independent_of_buffer_size(buffer_size in 1usize..300) {
        let bytes = with_garbage().build();
        let expected = scan(&bytes, DEFAULT_BUFFER_SIZE);
        prop_assert_eq!(scan(&bytes, buffer_size), expected);
    }

    #[test]
    fn scan_from_any_offset_ends_on_the_last_frame(skip in 0usize..400) {
        let bytes = FlacBuilder::default().build();
        let start = find_frame_start(&mut Cursor::new(bytes.clone())).unwrap();
        let offset = (start + skip as u64).min(bytes.len() as u64);

        let mut src = Cursor::new(bytes.clone());
        let options = ScanOptions { buffer_size: 32, start_offset: Some(offset) };
        let frames = FrameScanner::new(&mut src, options).unwrap().collect::<Result<Vec<_>, _>>().unwrap();

        let all = scan(&bytes, DEFAULT_BUFFER_SIZE);
        let last = all.last().unwrap();
        if offset <= last.byte_offset {
            prop_assert_eq!(frames.last().map(|f| (f.byte_offset, f.header)), Some((last.byte_offset, last.header)));
        } else {
            prop_assert!(frames.is_empty());
        }
    }
}
