//! Positional byte access.
//!
//! The format readers never hold a cursor of their own; they ask for bytes at
//! an absolute offset.  [`ByteSource`] is implemented for everything that is
//! `Read + Seek`, so a `std::fs::File` and an in-memory `Cursor<Vec<u8>>`
//! behave identically.

use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::ops::Range;

use serde::Serialize;

/// A half-open absolute byte range `[start, end)` within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ByteRange {
    pub start: u64,
    pub end:   u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_range(&self) -> Range<u64> {
        self.start..self.end
    }
}

// ── Read side ─────────────────────────────────────────────────────────────────

pub trait ByteSource {
    /// Total length of the underlying data.
    fn length(&mut self) -> io::Result<u64>;

    /// Position the sequential cursor.  Returns the position actually reached.
    fn seek_to(&mut self, offset: u64) -> io::Result<u64>;

    /// Read from the sequential cursor, filling as much of `buf` as the data
    /// allows.  A short count means end of data.
    fn read_sequential(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Read up to `buf.len()` bytes starting at `offset`.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let landed = self.seek_to(offset)?;
        if landed != offset {
            return Ok(0);
        }
        self.read_sequential(buf)
    }

    /// Read exactly `buf.len()` bytes at `offset` or fail with `UnexpectedEof`.
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let n = self.read_at(offset, buf)?;
        if n < buf.len() {
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("wanted {} bytes at offset {offset}, got {n}", buf.len()),
            ));
        }
        Ok(())
    }

    /// Read the bytes covered by `range`.
    fn read_range(&mut self, range: ByteRange) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; range.len() as usize];
        self.read_exact_at(range.start, &mut buf)?;
        Ok(buf)
    }
}

impl<T: Read + Seek> ByteSource for T {
    fn length(&mut self) -> io::Result<u64> {
        let here = self.stream_position()?;
        let end  = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(here))?;
        Ok(end)
    }

    fn seek_to(&mut self, offset: u64) -> io::Result<u64> {
        self.seek(SeekFrom::Start(offset))
    }

    fn read_sequential(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

// ── Write side ────────────────────────────────────────────────────────────────

/// A [`ByteSource`] that can also be overwritten in place.
pub trait ByteSink: ByteSource {
    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()>;
}

impl<T: Read + Write + Seek> ByteSink for T {
    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        let landed = self.seek(SeekFrom::Start(offset))?;
        if landed != offset {
            return Err(io::Error::new(ErrorKind::Other, format!("could not seek to {offset}")));
        }
        self.write_all(bytes)?;
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn read_at_is_positional() {
        let mut src = Cursor::new(vec![1u8, 2, 3, 4, 5]);
        let mut buf = [0u8; 2];
        assert_eq!(src.read_at(3, &mut buf).unwrap(), 2);
        assert_eq!(buf, [4, 5]);
        assert_eq!(src.read_at(4, &mut buf).unwrap(), 1);
        assert!(src.read_exact_at(4, &mut buf).is_err());
        assert_eq!(src.length().unwrap(), 5);
    }

    #[test]
    fn write_at_overwrites_without_growing() {
        let mut src = Cursor::new(vec![0u8; 4]);
        src.write_at(1, &[9, 9]).unwrap();
        assert_eq!(src.into_inner(), vec![0, 9, 9, 0]);
    }
}
