#![allow(dead_code)]

use sensorfix::flac::frame::{BlockingStrategy, ChannelAssignment, FrameHeader};
use sensorfix::flac::metadata::MetadataBlockType;
use sensorfix::flac::{StreamInfo, MAGIC};
use std::path::{Path, PathBuf};

/// Opaque bytes after each frame header.  Zero, so no stray sync codes.
pub const FRAME_BODY: usize = 48;

/// A synthetic Frontier Labs style FLAC file.  Frames carry headers only;
/// the subframe bytes are zero filler.
#[derive(Clone)]
pub struct FlacBuilder {
    pub sample_rate:     u32,
    pub bits_per_sample: u8,
    pub block_size:      u32,
    /// Frame number of the first frame written.
    pub first_frame:     u32,
    /// Frames written, the last one included.
    pub frames:          u32,
    pub last_block_size: u32,
    /// STREAMINFO total samples; `None` writes the true count.
    pub total_samples:   Option<u64>,
    pub firmware:        Option<String>,
    pub recording_start: Option<String>,
    /// Spaces appended to the firmware comment.
    pub firmware_room:   usize,
    /// Bytes inserted after the frame with this position in the file.
    pub garbage:         Option<(u32, Vec<u8>)>,
    /// Bytes appended after the last frame.
    pub trailer:         Vec<u8>,
}

impl Default for FlacBuilder {
    fn default() -> Self {
        Self {
            sample_rate:     22_050,
            bits_per_sample: 16,
            block_size:      4096,
            first_frame:     0,
            frames:          8,
            last_block_size: 1000,
            total_samples:   None,
            firmware:        Some("V3.20".into()),
            recording_start: Some("2020-04-26T02:00:00+10:00".into()),
            firmware_room:   40,
            garbage:         None,
            trailer:         Vec::new(),
        }
    }
}

impl FlacBuilder {
    /// Samples the frames actually hold.
    pub fn true_total(&self) -> u64 {
        (self.first_frame as u64 + self.frames as u64 - 1) * self.block_size as u64 + self.last_block_size as u64
    }

    pub fn frame_length(&self) -> usize {
        self.frame(self.first_frame, self.block_size).len()
    }

    pub fn header(&self, number: u32, block_size: u32) -> FrameHeader {
        FrameHeader {
            blocking_strategy:  BlockingStrategy::Fixed,
            block_size,
            sample_rate:        self.sample_rate,
            channel_assignment: ChannelAssignment::Mono,
            bits_per_sample:    self.bits_per_sample,
            frame_number:       Some(number),
            starting_sample:    None,
            crc8:               0,
        }
    }

    pub fn frame(&self, number: u32, block_size: u32) -> Vec<u8> {
        let mut out = self
            .header(number, block_size)
            .encode(self.sample_rate, self.bits_per_sample)
            .unwrap();
        out.resize(out.len() + FRAME_BODY, 0);
        out
    }

    fn comments(&self) -> Vec<u8> {
        let vendor = b"Frontier Labs";
        let mut comments: Vec<String> = Vec::new();
        if let Some(fw) = &self.firmware {
            comments.push(format!("SensorFirmwareVersion={fw}{}", " ".repeat(self.firmware_room)));
        }
        if let Some(start) = &self.recording_start {
            comments.push(format!("RecordingStart={start}"));
        }
        comments.push("SensorUid=0000123456789ABC".into());

        let mut out = Vec::new();
        out.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        out.extend_from_slice(vendor);
        out.extend_from_slice(&(comments.len() as u32).to_le_bytes());
        for c in comments {
            out.extend_from_slice(&(c.len() as u32).to_le_bytes());
            out.extend_from_slice(c.as_bytes());
        }
        out
    }

    pub fn build(&self) -> Vec<u8> {
        let max_frame = self.frame_length() as u32 + 8;
        let info = StreamInfo {
            min_block_size:  self.block_size as u16,
            max_block_size:  self.block_size as u16,
            min_frame_size:  0,
            max_frame_size:  max_frame,
            sample_rate:     self.sample_rate,
            channels:        1,
            bits_per_sample: self.bits_per_sample,
            total_samples:   self.total_samples.unwrap_or_else(|| self.true_total()),
            md5:             [0; 16],
        };

        let mut out = MAGIC.to_vec();
        push_block(&mut out, MetadataBlockType::StreamInfo, false, &info.to_payload());
        push_block(&mut out, MetadataBlockType::VorbisComment, false, &self.comments());
        push_block(&mut out, MetadataBlockType::Padding, true, &[0u8; 64]);

        for i in 0..self.frames {
            let number = self.first_frame + i;
            let block = if i + 1 == self.frames { self.last_block_size } else { self.block_size };
            out.extend(self.frame(number, block));
            if let Some((after, garbage)) = &self.garbage {
                if *after == i {
                    out.extend_from_slice(garbage);
                }
            }
        }
        out.extend_from_slice(&self.trailer);
        out
    }

    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }
}

fn push_block(out: &mut Vec<u8>, block_type: MetadataBlockType, last: bool, payload: &[u8]) {
    let flag = if last { 0x80 } else { 0 };
    out.push(flag | block_type.code());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes()[1..]);
    out.extend_from_slice(payload);
}

/// A 16-bit mono PCM WAVE file.  `riff_length`/`data_length` override the
/// true values.
pub fn wave(payload: usize, riff_length: Option<u32>, data_length: Option<u32>) -> Vec<u8> {
    let true_riff = (4 + 8 + 16 + 8 + payload) as u32;
    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&riff_length.unwrap_or(true_riff).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&22_050u32.to_le_bytes());
    out.extend_from_slice(&44_100u32.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_length.unwrap_or(payload as u32).to_le_bytes());
    out.resize(out.len() + payload, 0x11);
    out
}

/// A pre-allocated stub: a WAVE header declaring 44 data bytes, all zero.
pub fn stub() -> Vec<u8> {
    let mut out = wave(44, None, None);
    let len = out.len();
    out[len - 44..].fill(0);
    out
}

pub fn checksum(path: &Path) -> String {
    sensorfix::files::checksum(path).unwrap()
}
