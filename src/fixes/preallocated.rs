//! FL001: pre-allocated stubs.
//!
//! Frontier Labs recorders allocate each output file as a small WAVE header
//! before any audio arrives.  A recording that never started leaves that
//! header behind, sometimes under a `.flac` name.  Detection is the fault
//! scoring in [`is_preallocated_header`]; there is nothing to repair, so
//! `apply` renames affected files to `<name>.error_stub`.

use std::fs::File;
use std::path::Path;

use crate::fixes::{problems, CheckOperation, CheckResult, CheckStatus, FixError, OperationInfo, Severity};
use crate::frontier_labs::is_preallocated_header;
use crate::source::ByteSource;

pub const MESSAGE: &str = "The file is a stub and has no usable data";

/// A header the recorder allocated but never filled.  Check only.
pub struct PreAllocatedHeader;

impl PreAllocatedHeader {
    pub const INFO: OperationInfo = OperationInfo {
        problem:   problems::PRE_ALLOCATED_HEADER,
        fixable:   false,
        safe:      true,
        automatic: false,
        suffix:    Some("stub"),
    };

    fn check(path: &Path) -> Result<CheckResult, FixError> {
        let mut file = File::open(path)?;
        if is_preallocated_header(&mut file, path)? {
            return Ok(CheckResult::new(CheckStatus::Affected, Severity::Severe, MESSAGE));
        }
        Ok(match file.length()? {
            0 => CheckResult::silent(CheckStatus::NotApplicable),
            _ => CheckResult::silent(CheckStatus::Unaffected),
        })
    }
}

impl CheckOperation for PreAllocatedHeader {
    fn info(&self) -> OperationInfo {
        Self::INFO
    }

    fn check_affected(&self, path: &Path) -> CheckResult {
        Self::check(path).unwrap_or_else(CheckResult::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn zero_filled_header_is_a_stub() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("20200426T020000+1000_site.flac");
        fs::write(&path, [0u8; 44]).unwrap();

        let check = PreAllocatedHeader.check_affected(&path);
        assert_eq!((check.status, check.severity), (CheckStatus::Affected, Severity::Severe));
        assert_eq!(check.message.as_deref(), Some(MESSAGE));
        assert_eq!(PreAllocatedHeader::INFO.error_name(&path), "20200426T020000+1000_site.flac.error_stub");
    }

    #[test]
    fn empty_and_ordinary_files() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("a.flac");
        fs::write(&empty, b"").unwrap();
        let audio = dir.path().join("b.flac");
        fs::write(&audio, [0x11u8; 1000]).unwrap();

        assert_eq!(PreAllocatedHeader.check_affected(&empty).status, CheckStatus::NotApplicable);
        assert_eq!(PreAllocatedHeader.check_affected(&audio).status, CheckStatus::Unaffected);
    }
}
