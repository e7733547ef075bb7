use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sensorfix::flac::frame::{BlockingStrategy, ChannelAssignment, FrameHeader};
use sensorfix::flac::{count_samples, FrameScanner, ScanOptions, StreamInfo, MAGIC};
use std::io::Cursor;

const BLOCK_SIZE: u32 = 4096;

/// A minimal FLAC stream: STREAMINFO and `frames` headers with zero bodies.
fn stream(frames: u32, body: usize) -> Vec<u8> {
    let info = StreamInfo {
        min_block_size:  BLOCK_SIZE as u16,
        max_block_size:  BLOCK_SIZE as u16,
        min_frame_size:  0,
        max_frame_size:  body as u32 + 16,
        sample_rate:     22_050,
        channels:        1,
        bits_per_sample: 16,
        total_samples:   frames as u64 * BLOCK_SIZE as u64,
        md5:             [0; 16],
    };

    let mut out = MAGIC.to_vec();
    out.extend_from_slice(&[0x80, 0, 0, 34]);
    out.extend_from_slice(&info.to_payload());
    for n in 0..frames {
        let header = FrameHeader {
            blocking_strategy:  BlockingStrategy::Fixed,
            block_size:         BLOCK_SIZE,
            sample_rate:        22_050,
            channel_assignment: ChannelAssignment::Mono,
            bits_per_sample:    16,
            frame_number:       Some(n),
            starting_sample:    None,
            crc8:               0,
        };
        out.extend(header.encode(22_050, 16).unwrap());
        // sync-like noise inside the body exercises the resync path
        let mut filler = vec![0u8; body];
        for chunk in filler.chunks_mut(97) {
            chunk[0] = 0xFF;
            if chunk.len() > 1 {
                chunk[1] = 0xF8;
            }
        }
        out.extend(filler);
    }
    out
}

fn bench_full_scan(c: &mut Criterion) {
    let data = stream(2_000, 1_000);

    c.bench_function("scan_2000_frames", |b| {
        b.iter(|| {
            let mut src = Cursor::new(black_box(&data[..]));
            FrameScanner::new(&mut src, ScanOptions::default()).unwrap().count()
        })
    });

    c.bench_function("scan_2000_frames_small_buffer", |b| {
        b.iter(|| {
            let mut src = Cursor::new(black_box(&data[..]));
            let options = ScanOptions { buffer_size: 64, ..ScanOptions::default() };
            FrameScanner::new(&mut src, options).unwrap().count()
        })
    });
}

fn bench_count_samples(c: &mut Criterion) {
    let data = stream(2_000, 1_000);

    c.bench_function("count_samples_tail", |b| {
        b.iter(|| count_samples(&mut Cursor::new(black_box(&data[..])), false).unwrap())
    });
    c.bench_function("count_samples_full", |b| {
        b.iter(|| count_samples(&mut Cursor::new(black_box(&data[..])), true).unwrap())
    });
}

criterion_group!(benches, bench_full_scan, bench_count_samples);
criterion_main!(benches);
