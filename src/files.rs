//! File-level operations used by the fixes: renames, backups, truncation and
//! checksums.  Everything that mutates takes a [`DryRun`].

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::dry_run::DryRun;
use crate::source::ByteSource;

pub const BACKUP_EXTENSION: &str = "bak";

const SCAN_CHUNK: usize = 64 * 1024;

/// Rename `path` to `new_basename` in the same directory.  Returns the
/// destination; in a dry run nothing moves.
pub fn rename(path: &Path, new_basename: &str, dry_run: &DryRun) -> io::Result<PathBuf> {
    let dest = path.with_file_name(new_basename);
    if dest.exists() {
        return Err(io::Error::new(
            ErrorKind::AlreadyExists,
            format!("cannot rename {} to {}: destination exists", path.display(), dest.display()),
        ));
    }

    dry_run.would_do(format!("rename {} to {}", path.display(), dest.display()), || fs::rename(path, &dest))?;
    Ok(dest)
}

/// Copy `path` to `<path>.bak`, or `.bak2`, `.bak3`... if taken.
pub fn backup(path: &Path, dry_run: &DryRun) -> io::Result<PathBuf> {
    let mut n = 1u32;
    let dest = loop {
        let suffix = if n == 1 { BACKUP_EXTENSION.to_owned() } else { format!("{BACKUP_EXTENSION}{n}") };
        let mut candidate = path.as_os_str().to_owned();
        candidate.push(".");
        candidate.push(suffix);
        let candidate = PathBuf::from(candidate);
        if !candidate.exists() {
            break candidate;
        }
        n += 1;
    };

    dry_run.would_do(format!("back up {} to {}", path.display(), dest.display()), || fs::copy(path, &dest))?;
    Ok(dest)
}

/// Move the bytes from `at` onwards into a new file at `fragment`, then cut
/// `file` down to `at` bytes.
pub fn truncate_split(file: &mut File, fragment: &Path, at: u64, dry_run: &DryRun) -> io::Result<()> {
    let length = file.metadata()?.len();
    if at > length {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!("cannot split at {at}: file is only {length} bytes"),
        ));
    }

    dry_run.would_do(
        format!("move {} bytes from offset {at} to {}", length - at, fragment.display()),
        || -> io::Result<()> {
            let mut out = OpenOptions::new().write(true).create_new(true).open(fragment)?;
            file.seek(SeekFrom::Start(at))?;
            let copied = io::copy(&mut Read::by_ref(file).take(length - at), &mut out)?;
            out.sync_all()?;
            debug!(copied, fragment = %fragment.display(), "wrote fragment");
            Ok(())
        },
    )?;

    dry_run.would_do(format!("truncate file to {at} bytes"), || file.set_len(at))?;
    Ok(())
}

/// Whether every byte from `offset` to the end of `source` equals `value`.
pub fn check_for_continuous_value<S: ByteSource + ?Sized>(source: &mut S, offset: u64, value: u8) -> io::Result<bool> {
    let length = source.length()?;
    let mut buf = vec![0u8; SCAN_CHUNK];
    let mut position = offset;
    while position < length {
        let want = ((length - position) as usize).min(buf.len());
        let read = source.read_at(position, &mut buf[..want])?;
        if read == 0 {
            break;
        }
        if buf[..read].iter().any(|&b| b != value) {
            return Ok(false);
        }
        position += read as u64;
    }
    Ok(true)
}

/// BLAKE3 of the whole file, hex encoded.
pub fn checksum(path: &Path) -> io::Result<String> {
    let mut hasher = blake3::Hasher::new();
    let mut file = File::open(path)?;
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// Final path component as UTF-8, lossily.
pub fn basename(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}
