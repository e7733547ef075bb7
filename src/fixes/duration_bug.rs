//! FL010: firmware 3.17 up to (not including) 3.28 wrote STREAMINFO total
//! samples as double the real count.
//!
//! The file is affected when the firmware is in that range and the declared
//! count is exactly [`DURATION_BUG_FACTOR`] times the count found by scanning
//! the last frames.  The repair writes the counted value and tags the firmware
//! comment, after which the check reports `Repaired`.

use std::fs::File;
use std::path::Path;

use tracing::{debug, warn};

use crate::dry_run::DryRun;
use crate::fixes::{
    open_for_fix, problems, CheckOperation, CheckResult, CheckStatus, Evidence, FixError, FixOperation, FixResult,
    FixStatus, OperationInfo, Severity,
};
use crate::flac::streaminfo::{read_total_samples, write_total_samples};
use crate::flac::{self, count_samples};
use crate::frontier_labs::{read_firmware, write_firmware, FirmwareError, FirmwareRecord};
use crate::source::ByteSource;

/// First affected firmware version.
pub const AFFECTED_FIRMWARE_MIN: f64 = 3.17;
/// First firmware version with the bug fixed.
pub const AFFECTED_FIRMWARE_MAX: f64 = 3.28;
/// The declared count of an affected file is this multiple of the real one.
pub const DURATION_BUG_FACTOR: u64 = 2;

pub struct MetadataDurationBug;

impl MetadataDurationBug {
    pub const INFO: OperationInfo = OperationInfo {
        problem:   problems::METADATA_DURATION_BUG,
        fixable:   true,
        safe:      true,
        automatic: true,
        suffix:    None,
    };

    pub fn patch_tag() -> String {
        Self::INFO.problem.patch_tag()
    }

    pub fn is_affected_firmware(firmware: &FirmwareRecord) -> bool {
        (AFFECTED_FIRMWARE_MIN..AFFECTED_FIRMWARE_MAX).contains(&firmware.version)
    }

    pub fn is_doubled(header_samples: u64, counted_samples: u64) -> bool {
        header_samples != counted_samples && counted_samples.checked_mul(DURATION_BUG_FACTOR) == Some(header_samples)
    }

    /// Check an already open FLAC stream.
    pub fn inspect<S: ByteSource + ?Sized>(source: &mut S) -> CheckResult {
        Self::try_inspect(source).unwrap_or_else(CheckResult::from)
    }

    fn try_inspect<S: ByteSource + ?Sized>(source: &mut S) -> Result<CheckResult, FixError> {
        match flac::is_flac(source) {
            Err(e) => return Ok(CheckResult::new(CheckStatus::Error, Severity::None, e.to_string())),
            Ok(false) => {
                return Ok(CheckResult::new(CheckStatus::Unaffected, Severity::None, "Audio recording is not a FLAC file"))
            }
            Ok(true) => {}
        }

        let firmware = match read_firmware(source) {
            Ok(firmware) => firmware,
            Err(e @ FirmwareError::FirmwareNotFound) => {
                return Ok(CheckResult::new(CheckStatus::Unaffected, Severity::None, e.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if !Self::is_affected_firmware(&firmware) {
            debug!(version = firmware.version, "firmware outside the affected range");
            return Ok(CheckResult::new(CheckStatus::Unaffected, Severity::None, "File not affected"));
        }

        let header_samples = read_total_samples(source)?;
        let counted_samples = count_samples(source, false)?;
        let repaired = firmware.has_tag(&Self::patch_tag());

        let result = if Self::is_doubled(header_samples, counted_samples) {
            CheckResult::new(CheckStatus::Affected, Severity::Moderate, "File's duration is wrong")
        } else if repaired {
            CheckResult::new(CheckStatus::Repaired, Severity::None, "File has already had it's duration repaired")
        } else {
            CheckResult::new(CheckStatus::Unaffected, Severity::None, "File not affected")
        };

        Ok(result.with_evidence(Evidence::Duration { firmware, header_samples, counted_samples }))
    }
}

impl CheckOperation for MetadataDurationBug {
    fn info(&self) -> OperationInfo {
        Self::INFO
    }

    fn check_affected(&self, path: &Path) -> CheckResult {
        match File::open(path) {
            Ok(mut file) => Self::inspect(&mut file),
            Err(e) => CheckResult::from(FixError::from(e)),
        }
    }

    fn as_fix(&self) -> Option<&dyn FixOperation> {
        Some(self)
    }
}

impl FixOperation for MetadataDurationBug {
    fn process_file(&self, path: &Path, dry_run: &DryRun) -> Result<FixResult, FixError> {
        let check = self.check_affected(path);
        let evidence = check.evidence.clone().filter(|_| check.is_affected());
        let Some(Evidence::Duration { firmware, header_samples, counted_samples }) = evidence else {
            return Ok(FixResult::no_operation(check));
        };

        let mut file = open_for_fix(path, dry_run)?;
        debug!("Changing duration from {header_samples} to {counted_samples}");

        let written = dry_run.would_do(format!("write total samples {counted_samples}"), || {
            write_total_samples(&mut file, counted_samples)
        });
        if let Err(e) = written {
            warn!(error = %e, path = %path.display(), "failed to write total samples");
            return Ok(FixResult::new(
                FixStatus::NotFixed,
                check,
                "Failed to write new total samples value. File is likely corrupt now.",
            ));
        }

        let tag = Self::patch_tag();
        let tagged = firmware.with_tag(&tag);
        dry_run.would_do(format!("update firmware tag with {tag}"), || write_firmware(&mut file, &tagged))?;

        Ok(FixResult::new(
            FixStatus::Fixed,
            check,
            format!("Old total samples was {header_samples}, new total samples is: {counted_samples}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubling_rule() {
        assert!(MetadataDurationBug::is_doubled(317_292_544, 158_646_272));
        assert!(!MetadataDurationBug::is_doubled(158_646_272, 158_646_272));
        assert!(!MetadataDurationBug::is_doubled(317_292_545, 158_646_272));
        assert!(!MetadataDurationBug::is_doubled(0, 0));
    }
}
