//! Frontier Labs recorder metadata.
//!
//! Frontier Labs sensors write their FLAC files with a Vorbis comment block
//! whose vendor string is `Frontier Labs`.  One of its comments records the
//! firmware:
//!
//! ```text
//! SensorFirmwareVersion=V3.20 EMU+FL010
//! SensorFirmwareVersion=Firmware: V3.12
//! ```
//!
//! The firmware pads the comment with spaces, which leaves room to append
//! tags after the version.  Repairs use those tags to mark a file as already
//! fixed; see [`FirmwareRecord::tags`].
//!
//! The same sensors pre-allocate their output as a small WAVE header before
//! any audio arrives.  A recording interrupted at that point leaves a stub;
//! [`is_preallocated_header`] and [`is_preallocated_file`] recognise them.

use std::io;
use std::path::Path;

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::files::check_for_continuous_value;
use crate::flac::vorbis::{read_vorbis_comments, VorbisComments};
use crate::flac::{self, FlacError};
use crate::source::{ByteRange, ByteSink, ByteSource};
use crate::wave;

pub const FIRMWARE_COMMENT_KEY:        &str = "SensorFirmwareVersion";
pub const RECORDING_START_COMMENT_KEY: &str = "RecordingStart";

/// File lengths the firmware uses for freshly allocated stubs.
pub const DEFAULT_FILE_STUB_LENGTH:   u64 = 44;
pub const DEFAULT_FILE_STUB_LENGTH_2: u64 = 153;
/// Data chunk length declared by a stub that was never written to.
pub const DEFAULT_STUB_DATA_LENGTH:   u64 = 44;

/// Files shorter than this are suspicious on their own.
const SMALL_FILE_LENGTH: u64 = 200;
/// Faults needed before a file is judged a stub.
const STUB_FAULT_THRESHOLD: u32 = 3;

const FIRMWARE_PREFIX_WORD: &str = "Firmware:";

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum FirmwareError {
    #[error("Not a FLAC file")]
    NotFlac,
    #[error("Frontier Labs firmware comment string not found")]
    FirmwareNotFound,
    #[error("Frontier Labs firmware version `{0}` can't be parsed")]
    FirmwareVersionInvalid(String),
    #[error("Comment `{0}` not found")]
    CommentNotFound(&'static str),
    #[error("Date `{0}` can't be parsed")]
    DateInvalid(String),
    #[error("tags must be short enough to fit within existing firmware comment ({needed} > {available} bytes)")]
    TagsTooLong { needed: u64, available: u64 },
    #[error(transparent)]
    Flac(#[from] FlacError),
    #[error(transparent)]
    Wave(#[from] wave::WaveError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Firmware record ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FirmwareRecord {
    /// The whole `KEY=value` comment as found.
    pub comment:      String,
    pub version:      f64,
    /// The version exactly as written, e.g. `V3.20` or `Firmware: V3.12`.
    pub version_text: String,
    /// Where the comment text sits in the file.
    pub found_at:     ByteRange,
    /// Space-separated words following the version.
    pub tags:         Vec<String>,
}

impl FirmwareRecord {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Append `tag` unless it is already present.
    pub fn with_tag(mut self, tag: &str) -> Self {
        if !self.has_tag(tag) {
            self.tags.push(tag.to_owned());
        }
        self
    }

    /// The comment text this record would be written back as, unpadded.
    pub fn render(&self) -> String {
        let mut text = format!("{FIRMWARE_COMMENT_KEY}={}", self.version_text);
        for tag in &self.tags {
            text.push(' ');
            text.push_str(tag);
        }
        text
    }
}

/// Parse the value of a firmware comment found at `found_at`.
pub fn parse_firmware_comment(comment: &str, found_at: ByteRange) -> Result<FirmwareRecord, FirmwareError> {
    let value = comment.split_once('=').map(|(_, v)| v).unwrap_or("");
    let words: Vec<&str> = value.split(' ').filter(|w| !w.is_empty()).collect();

    let invalid = || FirmwareError::FirmwareVersionInvalid(comment.trim_end().to_owned());
    let head = match words.first() {
        None => return Err(invalid()),
        Some(w) if w.contains(FIRMWARE_PREFIX_WORD) => 2,
        Some(_) => 1,
    };
    let firmware = words.get(head - 1).ok_or_else(invalid)?;
    let number = firmware.strip_prefix('V').unwrap_or(firmware);
    let version: f64 = number.parse().map_err(|_| invalid())?;
    if !version.is_finite() {
        return Err(invalid());
    }

    Ok(FirmwareRecord {
        comment: comment.to_owned(),
        version,
        version_text: words[..head].join(" "),
        found_at,
        tags: words[head..].iter().map(|w| (*w).to_owned()).collect(),
    })
}

fn find_firmware(comments: &VorbisComments) -> Result<FirmwareRecord, FirmwareError> {
    let found = comments
        .comments
        .iter()
        .find(|c| c.key == FIRMWARE_COMMENT_KEY)
        .ok_or(FirmwareError::FirmwareNotFound)?;
    let text = format!("{}={}", found.key, found.value);
    parse_firmware_comment(&text, found.range)
}

fn require_flac<S: ByteSource + ?Sized>(source: &mut S) -> Result<(), FirmwareError> {
    if !flac::is_flac(source)? {
        return Err(FirmwareError::NotFlac);
    }
    Ok(())
}

pub fn read_firmware<S: ByteSource + ?Sized>(source: &mut S) -> Result<FirmwareRecord, FirmwareError> {
    require_flac(source)?;
    let comments = read_vorbis_comments(source)?;
    find_firmware(&comments)
}

/// Overwrite the firmware comment in place with `record`'s version and tags,
/// space-padded to the comment's original length.
pub fn write_firmware<S: ByteSink + ?Sized>(sink: &mut S, record: &FirmwareRecord) -> Result<(), FirmwareError> {
    let mut text = record.render().into_bytes();
    let available = record.found_at.len();
    if text.len() as u64 > available {
        return Err(FirmwareError::TagsTooLong { needed: text.len() as u64, available });
    }
    text.resize(available as usize, b' ');

    debug!(offset = record.found_at.start, tags = ?record.tags, "writing firmware comment");
    sink.write_at(record.found_at.start, &text)?;
    Ok(())
}

// ── Recording start ───────────────────────────────────────────────────────────

/// A recording timestamp.  Newer firmware writes an offset, older firmware
/// only local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordingStart {
    Offset(DateTime<FixedOffset>),
    Local(NaiveDateTime),
}

impl RecordingStart {
    pub fn parse(value: &str) -> Result<Self, FirmwareError> {
        let value = value.trim();
        if let Ok(date) = DateTime::parse_from_rfc3339(value) {
            return Ok(Self::Offset(date));
        }
        if let Ok(date) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%#z") {
            return Ok(Self::Offset(date));
        }
        if let Ok(date) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
            return Ok(Self::Local(date));
        }
        Err(FirmwareError::DateInvalid(value.to_owned()))
    }

    /// Basic ISO 8601 form used in file names: `20200426T020000Z`,
    /// `20220426T040000+1000`, or `20220426T040000` for local times.
    pub fn to_filename_stamp(&self) -> String {
        match self {
            Self::Offset(date) if date.offset().local_minus_utc() == 0 => {
                date.format("%Y%m%dT%H%M%SZ").to_string()
            }
            Self::Offset(date) => date.format("%Y%m%dT%H%M%S%z").to_string(),
            Self::Local(date) => date.format("%Y%m%dT%H%M%S").to_string(),
        }
    }
}

pub fn read_recording_start<S: ByteSource + ?Sized>(source: &mut S) -> Result<RecordingStart, FirmwareError> {
    require_flac(source)?;
    let comments = read_vorbis_comments(source)?;
    let comment = comments
        .get(RECORDING_START_COMMENT_KEY)
        .ok_or(FirmwareError::CommentNotFound(RECORDING_START_COMMENT_KEY))?;
    RecordingStart::parse(&comment.value)
}

// ── Stubs ─────────────────────────────────────────────────────────────────────

/// Whether the file looks like a pre-allocated header that never received
/// audio.  Scores independent faults and judges at [`STUB_FAULT_THRESHOLD`].
pub fn is_preallocated_header<S: ByteSource + ?Sized>(source: &mut S, path: &Path) -> Result<bool, FirmwareError> {
    let length = source.length()?;
    if length == 0 {
        return Ok(false);
    }

    let mut faults = 0u32;
    if length == DEFAULT_FILE_STUB_LENGTH || length == DEFAULT_FILE_STUB_LENGTH_2 {
        faults += 2;
    } else if length < SMALL_FILE_LENGTH {
        faults += 1;
    }

    let riff = wave::find_riff_chunk(source);
    let is_flac_name = path.extension().is_some_and(|e| e.eq_ignore_ascii_case(flac::EXTENSION));
    if is_flac_name && riff.is_ok() {
        faults += 1;
    }

    let riff = match riff {
        Ok(riff) => riff,
        Err(_) => {
            let mut magic = [0u8; 4];
            source.read_at(0, &mut magic)?;
            if magic == [0; 4] {
                faults += 1;
            }
            return Ok(faults >= STUB_FAULT_THRESHOLD);
        }
    };
    if riff.end != length {
        faults += 1;
    }

    let data = wave::find_wave_chunk(source, riff).and_then(|w| wave::find_data_chunk(source, w, false));
    let Ok(data) = data else {
        return Ok(faults >= STUB_FAULT_THRESHOLD);
    };

    if data.len() < 4 {
        faults += 1;
    } else {
        let mut head = [0u8; 4];
        if source.read_at(data.start, &mut head)? == head.len() && head == [0; 4] {
            faults += 1;
        }
    }
    if data.end > length {
        faults += 1;
    }

    debug!(faults, "pre-allocated header score");
    Ok(faults >= STUB_FAULT_THRESHOLD)
}

/// Whether the file is a stub whose data chunk declares the default stub
/// length and holds nothing but zeros.
pub fn is_preallocated_file<S: ByteSource + ?Sized>(source: &mut S) -> Result<bool, FirmwareError> {
    let riff = wave::find_riff_chunk(source)?;
    let form = wave::find_wave_chunk(source, riff)?;
    let data = wave::find_data_chunk(source, form, true)?;
    if data.len() != DEFAULT_STUB_DATA_LENGTH {
        return Ok(false);
    }
    Ok(check_for_continuous_value(source, data.start, 0)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_plain_and_prefixed_versions() {
        let range = ByteRange::new(10, 60);
        let plain = parse_firmware_comment("SensorFirmwareVersion=V3.20 EMU+FL010    ", range).unwrap();
        assert_eq!(plain.version, 3.20);
        assert_eq!(plain.version_text, "V3.20");
        assert_eq!(plain.tags, vec!["EMU+FL010".to_owned()]);

        let prefixed = parse_firmware_comment("SensorFirmwareVersion=Firmware: V3.12", range).unwrap();
        assert_eq!(prefixed.version, 3.12);
        assert_eq!(prefixed.version_text, "Firmware: V3.12");
        assert!(prefixed.tags.is_empty());
    }

    #[test]
    fn unparseable_version_is_reported() {
        let err = parse_firmware_comment("SensorFirmwareVersion=Vx.y", ByteRange::new(0, 26)).unwrap_err();
        assert_eq!(err.to_string(), "Frontier Labs firmware version `SensorFirmwareVersion=Vx.y` can't be parsed");
    }

    #[test]
    fn write_pads_and_refuses_overflow() {
        let comment = "SensorFirmwareVersion=V3.20          ";
        let mut bytes = vec![0xAAu8; 4];
        bytes.extend_from_slice(comment.as_bytes());
        bytes.extend_from_slice(&[0xBB; 4]);
        let range = ByteRange::new(4, 4 + comment.len() as u64);

        let record = parse_firmware_comment(comment, range).unwrap().with_tag("EMU+FL010");
        let mut sink = Cursor::new(bytes);
        write_firmware(&mut sink, &record).unwrap();
        let bytes = sink.into_inner();
        assert_eq!(&bytes[4..4 + comment.len()], b"SensorFirmwareVersion=V3.20 EMU+FL010");
        assert_eq!(&bytes[bytes.len() - 4..], &[0xBB; 4]);

        let crowded = record.with_tag("EMU+FL011");
        let mut sink = Cursor::new(vec![0u8; 80]);
        assert!(matches!(write_firmware(&mut sink, &crowded), Err(FirmwareError::TagsTooLong { .. })));
    }

    #[test]
    fn recording_start_formats() {
        let utc = RecordingStart::parse("2020-04-26T02:00:00+00:00").unwrap();
        assert_eq!(utc.to_filename_stamp(), "20200426T020000Z");

        let aest = RecordingStart::parse("2022-04-26T04:00:00+10:00").unwrap();
        assert_eq!(aest.to_filename_stamp(), "20220426T040000+1000");

        let local = RecordingStart::parse("2019-11-02 23:14:00").unwrap();
        assert_eq!(local.to_filename_stamp(), "20191102T231400");

        assert!(RecordingStart::parse("yesterday").is_err());
    }

    #[test]
    fn zero_filled_stub_is_a_preallocated_header() {
        let mut src = Cursor::new(vec![0u8; DEFAULT_FILE_STUB_LENGTH as usize]);
        assert!(is_preallocated_header(&mut src, Path::new("data")).unwrap());

        let mut empty = Cursor::new(Vec::new());
        assert!(!is_preallocated_header(&mut empty, Path::new("data")).unwrap());
    }
}
