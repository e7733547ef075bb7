//! Vorbis comment block.
//!
//! Unlike the rest of FLAC the payload is little-endian:
//!
//! ```text
//! u32 vendor_length | vendor | u32 count | { u32 length | KEY=value } * count
//! ```
//!
//! Every comment keeps the absolute byte range of its text so a writer can
//! overwrite it in place without touching any length field.

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::flac::metadata::{scan_for_chunk, MetadataBlockType};
use crate::flac::FlacError;
use crate::source::{ByteRange, ByteSource};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub key:   String,
    pub value: String,
    /// Absolute range of the `KEY=value` text.
    pub range: ByteRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VorbisComments {
    pub vendor:   String,
    pub comments: Vec<Comment>,
}

impl VorbisComments {
    /// First comment whose key equals `key`, ignoring ASCII case.
    pub fn get(&self, key: &str) -> Option<&Comment> {
        self.comments.iter().find(|c| c.key.eq_ignore_ascii_case(key))
    }

    /// Parse a comment payload that starts at absolute offset `origin`.
    pub fn parse(payload: &[u8], origin: u64) -> Result<Self, FlacError> {
        let mut cursor = 0usize;

        let vendor_len = take_u32(payload, &mut cursor)? as usize;
        let vendor = take_bytes(payload, &mut cursor, vendor_len, "vendor string overruns block")?;
        let vendor = String::from_utf8_lossy(vendor).into_owned();

        let count = take_u32(payload, &mut cursor)?;
        let mut comments = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            let length = take_u32(payload, &mut cursor)? as usize;
            let start = cursor;
            let text = take_bytes(payload, &mut cursor, length, "comment overruns block")?;
            let text = String::from_utf8_lossy(text);
            let (key, value) = text.split_once('=').unwrap_or((&*text, ""));
            comments.push(Comment {
                key:   key.to_owned(),
                value: value.to_owned(),
                range: ByteRange::new(origin + start as u64, origin + cursor as u64),
            });
        }

        Ok(Self { vendor, comments })
    }
}

fn take_u32(payload: &[u8], cursor: &mut usize) -> Result<u32, FlacError> {
    let bytes = take_bytes(payload, cursor, 4, "length field overruns block")?;
    Ok(LittleEndian::read_u32(bytes))
}

fn take_bytes<'p>(
    payload: &'p [u8],
    cursor:  &mut usize,
    n:       usize,
    what:    &'static str,
) -> Result<&'p [u8], FlacError> {
    let end = cursor.checked_add(n).filter(|&end| end <= payload.len());
    let Some(end) = end else {
        return Err(FlacError::BadVorbisComment(what));
    };
    let bytes = &payload[*cursor..end];
    *cursor = end;
    Ok(bytes)
}

/// Read and parse the first Vorbis comment block of a FLAC stream.
pub fn read_vorbis_comments<S: ByteSource + ?Sized>(source: &mut S) -> Result<VorbisComments, FlacError> {
    let range = scan_for_chunk(source, MetadataBlockType::VorbisComment)?;
    let payload = source.read_range(range)?;
    VorbisComments::parse(&payload, range.start)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(vendor: &str, comments: &[&str]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        out.extend_from_slice(vendor.as_bytes());
        out.extend_from_slice(&(comments.len() as u32).to_le_bytes());
        for c in comments {
            out.extend_from_slice(&(c.len() as u32).to_le_bytes());
            out.extend_from_slice(c.as_bytes());
        }
        out
    }

    #[test]
    fn parses_vendor_and_comments_with_ranges() {
        let bytes = payload("Frontier Labs", &["A=1", "SensorFirmwareVersion=3.20"]);
        let parsed = VorbisComments::parse(&bytes, 100).unwrap();
        assert_eq!(parsed.vendor, "Frontier Labs");
        assert_eq!(parsed.comments.len(), 2);

        // 4 + 13 + 4 + 4 = 25
        assert_eq!(parsed.comments[0].range, ByteRange::new(125, 128));
        let fw = parsed.get("sensorfirmwareversion").unwrap();
        assert_eq!(fw.value, "3.20");
        assert_eq!(fw.range, ByteRange::new(132, 132 + 26));
    }

    #[test]
    fn comment_without_equals_has_empty_value() {
        let bytes = payload("v", &["lonely"]);
        let parsed = VorbisComments::parse(&bytes, 0).unwrap();
        assert_eq!(parsed.comments[0].key, "lonely");
        assert_eq!(parsed.comments[0].value, "");
    }

    #[test]
    fn overrunning_length_is_rejected() {
        let mut bytes = payload("v", &["A=1"]);
        bytes.truncate(bytes.len() - 1);
        let err = VorbisComments::parse(&bytes, 0).unwrap_err();
        assert!(matches!(err, FlacError::BadVorbisComment(_)));
    }
}
