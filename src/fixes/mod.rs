//! Known problems and the operations that detect and repair them.
//!
//! # Operations
//!
//! Every operation can *check* a file (read-only) and report a
//! [`CheckResult`].  Fixable operations can also *process* a file: check it
//! again, and if it is [`CheckStatus::Affected`] mutate it, reporting a
//! [`FixResult`].
//!
//! | Id    | Operation                 | Fixable | Safe | Automatic | Suffix    |
//! |-------|---------------------------|---------|------|-----------|-----------|
//! | OE004 | [`EmptyFile`]             | no      | yes  | no        | `empty`   |
//! | FL001 | [`PreAllocatedHeader`]    | no      | yes  | no        | `stub`    |
//! | FL008 | [`SpaceInDatestamp`]      | yes     | yes  | yes       |           |
//! | FL010 | [`MetadataDurationBug`]   | yes     | yes  | yes       |           |
//! | FL005 | [`IncorrectDataSize`]     | yes     | yes  | yes       |           |
//! | FL003 | [`DataSize0`]             | yes     | no   | yes       |           |
//! | FL011 | [`PartialFileRepair`]     | yes     | no   | yes       | `partial` |
//!
//! The registry order is the order `apply` runs fixes in.
//!
//! # Idempotence
//!
//! A fix followed by a check of the same file never reports `Affected` again.
//! FLAC fixes stamp an `EMU+<id>` tag into the firmware comment; the WAVE and
//! filename fixes converge because the repaired value no longer matches the
//! fault pattern.

pub mod apply;
pub mod data_size;
pub mod duration_bug;
pub mod empty_file;
pub mod partial_file;
pub mod preallocated;
pub mod space_in_datestamp;

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::dry_run::DryRun;
use crate::files::basename;
use crate::flac::FlacError;
use crate::frontier_labs::{FirmwareError, FirmwareRecord};
use crate::source::ByteRange;
use crate::wave::WaveError;

pub use apply::{apply, check, ApplyOptions, FixApplyResult, FixCheckResult};
pub use data_size::{DataSize0, IncorrectDataSize};
pub use duration_bug::MetadataDurationBug;
pub use empty_file::EmptyFile;
pub use partial_file::PartialFileRepair;
pub use preallocated::PreAllocatedHeader;
pub use space_in_datestamp::SpaceInDatestamp;

// ── Problems ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WellKnownProblem {
    pub id:          &'static str,
    pub title:       &'static str,
    pub description: &'static str,
    pub url:         &'static str,
}

impl WellKnownProblem {
    /// Tag written into a file to record that this problem was repaired.
    pub fn patch_tag(&self) -> String {
        format!("EMU+{}", self.id)
    }
}

pub mod problems {
    use super::WellKnownProblem;

    pub const EMPTY_FILE: WellKnownProblem = WellKnownProblem {
        id:          "OE004",
        title:       "Empty file",
        description: "File is empty",
        url:         "https://github.com/ecoacoustics/known-problems/blob/main/open_ecoacoustics/OE004.md",
    };

    pub const PRE_ALLOCATED_HEADER: WellKnownProblem = WellKnownProblem {
        id:          "FL001",
        title:       "Stub file",
        description: "This file is only a stub, it has no data in it",
        url:         "https://github.com/ecoacoustics/known-problems/blob/main/frontier_labs/FL001.md",
    };

    pub const CORRUPT_FULL_SIZE_FILES: WellKnownProblem = WellKnownProblem {
        id:          "FL003",
        title:       "Corrupt full size files",
        description: "The WAVE header's data chunk size was not correctly encoded",
        url:         "https://github.com/ecoacoustics/known-problems/blob/main/frontier_labs/FL003.md",
    };

    pub const INCORRECT_SUB_CHUNK_2: WellKnownProblem = WellKnownProblem {
        id:          "FL005",
        title:       "Incorrect SubChunk2 size",
        description: "The WAVE header's data chunk is the size of the file, not the chunk",
        url:         "https://github.com/ecoacoustics/known-problems/blob/main/frontier_labs/FL005.md",
    };

    pub const INVALID_DATE_STAMP_SPACE_ZERO: WellKnownProblem = WellKnownProblem {
        id:          "FL008",
        title:       "Invalid datestamp (space)",
        description: "There is a space character where a zero character should be",
        url:         "https://github.com/ecoacoustics/known-problems/blob/main/frontier_labs/FL008.md",
    };

    pub const METADATA_DURATION_BUG: WellKnownProblem = WellKnownProblem {
        id:          "FL010",
        title:       "Metadata Duration Bug",
        description: "This file's duration is wrong.",
        url:         "https://github.com/ecoacoustics/known-problems/blob/main/frontier_labs/FL010.md",
    };

    pub const PARTIAL_DATA_FILES: WellKnownProblem = WellKnownProblem {
        id:          "FL011",
        title:       "Partial file named data",
        description: "The data file is incomplete",
        url:         "https://github.com/ecoacoustics/known-problems/blob/main/frontier_labs/FL011.md",
    };
}

// ── Operation metadata ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OperationInfo {
    pub problem:   WellKnownProblem,
    pub fixable:   bool,
    /// Whether the fix can be applied without risk of losing data.
    pub safe:      bool,
    pub automatic: bool,
    /// Used in place of the id when naming an error file.
    pub suffix:    Option<&'static str>,
}

impl OperationInfo {
    /// `<basename>.error_<suffix or id>`.
    pub fn error_name(&self, path: &Path) -> String {
        format!("{}.error_{}", basename(path), self.suffix.unwrap_or(self.problem.id))
    }
}

// ── Results ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckStatus {
    Affected,
    Unaffected,
    NotApplicable,
    Repaired,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    None,
    Mild,
    Moderate,
    Severe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FixStatus {
    Fixed,
    NotFixed,
    Renamed,
    NoOperation,
}

/// What a check found, kept so the fix does not have to look again.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum Evidence {
    Duration {
        firmware:        FirmwareRecord,
        header_samples:  u64,
        counted_samples: u64,
    },
    Chunks {
        riff:   ByteRange,
        format: ByteRange,
        data:   ByteRange,
    },
    PartialFile {
        is_empty:             bool,
        is_flac:              bool,
        is_preallocated_file: bool,
    },
    NewName {
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub status:   CheckStatus,
    pub severity: Severity,
    pub message:  Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Evidence>,
}

impl CheckResult {
    pub fn new(status: CheckStatus, severity: Severity, message: impl Into<String>) -> Self {
        Self { status, severity, message: Some(message.into()), evidence: None }
    }

    pub fn silent(status: CheckStatus) -> Self {
        Self { status, severity: Severity::None, message: None, evidence: None }
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence = Some(evidence);
        self
    }

    pub fn is_affected(&self) -> bool {
        self.status == CheckStatus::Affected
    }
}

impl From<FixError> for CheckResult {
    fn from(e: FixError) -> Self {
        Self::new(CheckStatus::Error, Severity::None, e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixResult {
    pub status:   FixStatus,
    pub check:    CheckResult,
    pub message:  Option<String>,
    pub new_path: Option<PathBuf>,
}

impl FixResult {
    pub fn new(status: FixStatus, check: CheckResult, message: impl Into<String>) -> Self {
        Self { status, check, message: Some(message.into()), new_path: None }
    }

    /// Nothing to do; echoes the check's own message.
    pub fn no_operation(check: CheckResult) -> Self {
        let message = check.message.clone();
        Self { status: FixStatus::NoOperation, check, message, new_path: None }
    }

    pub fn with_new_path(mut self, path: PathBuf) -> Self {
        self.new_path = Some(path);
        self
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum FixError {
    #[error(transparent)]
    Flac(#[from] FlacError),
    #[error(transparent)]
    Wave(#[from] WaveError),
    #[error(transparent)]
    Firmware(#[from] FirmwareError),
    #[error("Could not find enough frames to repair the file: needed 3, found {0}")]
    NotEnoughFramesToRepair(usize),
    #[error("A unique name could not be determined for data file: {0} already exists")]
    NoUniqueName(PathBuf),
    #[error("Invalid file name pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("Unknown fix `{0}`")]
    UnknownOperation(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Open `path` for a fix: read-write, or read-only in a dry run.
pub(crate) fn open_for_fix(path: &Path, dry_run: &DryRun) -> io::Result<File> {
    OpenOptions::new().read(true).write(!dry_run.is_dry_run()).open(path)
}

// ── Traits ────────────────────────────────────────────────────────────────────

/// Detects one problem.  Checks never modify the file; any failure while
/// looking becomes a [`CheckStatus::Error`] result.
pub trait CheckOperation: Sync {
    fn info(&self) -> OperationInfo;

    fn check_affected(&self, path: &Path) -> CheckResult;

    fn as_fix(&self) -> Option<&dyn FixOperation> {
        None
    }
}

/// Repairs the problem its check detects.
pub trait FixOperation: CheckOperation {
    /// Check `path` and repair it if affected.  Files that are not affected
    /// come back as [`FixStatus::NoOperation`].
    fn process_file(&self, path: &Path, dry_run: &DryRun) -> Result<FixResult, FixError>;
}

// ── Registry ──────────────────────────────────────────────────────────────────

static OPERATIONS: &[&dyn CheckOperation] = &[
    &EmptyFile,
    &PreAllocatedHeader,
    &SpaceInDatestamp,
    &MetadataDurationBug,
    &IncorrectDataSize,
    &DataSize0,
    &PartialFileRepair,
];

/// Every registered operation, in pipeline order.
pub fn all_operations() -> &'static [&'static dyn CheckOperation] {
    OPERATIONS
}

/// Look an operation up by problem id, ignoring case.
pub fn resolve(id: &str) -> Result<&'static dyn CheckOperation, FixError> {
    OPERATIONS
        .iter()
        .copied()
        .find(|op| op.info().problem.id.eq_ignore_ascii_case(id))
        .ok_or_else(|| FixError::UnknownOperation(id.to_owned()))
}
