//! OE004: zero-length recordings.
//!
//! A sensor that opens a file and never writes to it leaves nothing to
//! repair.  The check runs first in the pipeline, and `apply` renames
//! affected files to `<name>.error_empty`.

use std::fs;
use std::path::Path;

use crate::fixes::{problems, CheckOperation, CheckResult, CheckStatus, FixError, OperationInfo, Severity};

/// A zero-length file.  Nothing can be recovered, so the only remedy is to
/// rename it out of the way.
pub struct EmptyFile;

impl EmptyFile {
    pub const INFO: OperationInfo = OperationInfo {
        problem:   problems::EMPTY_FILE,
        fixable:   false,
        safe:      true,
        automatic: false,
        suffix:    Some("empty"),
    };

    fn check(path: &Path) -> Result<CheckResult, FixError> {
        let length = fs::metadata(path)?.len();
        Ok(match length {
            0 => CheckResult::new(CheckStatus::Affected, Severity::Severe, Self::INFO.problem.description),
            _ => CheckResult::silent(CheckStatus::Unaffected),
        })
    }
}

impl CheckOperation for EmptyFile {
    fn info(&self) -> OperationInfo {
        Self::INFO
    }

    fn check_affected(&self, path: &Path) -> CheckResult {
        Self::check(path).unwrap_or_else(CheckResult::from)
    }
}
