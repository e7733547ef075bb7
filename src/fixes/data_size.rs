//! Bad RIFF and data chunk lengths written by Frontier Labs WAVE firmware.
//!
//! Two variants, both repaired the same way:
//!
//! | Id    | Fault |
//! |-------|-------|
//! | FL005 | both lengths exactly [`ERROR_AMOUNT`] bytes too long |
//! | FL003 | data length 0, RIFF length not matching the file |
//!
//! The repair rewrites the RIFF length as `file length - 8` and the data
//! length as everything from the data chunk to the end of the file.  These
//! files have no comment block to tag, so idempotence comes from the lengths
//! themselves: once correct they no longer match either fault.

use std::fs::File;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

use crate::dry_run::DryRun;
use crate::fixes::{
    open_for_fix, problems, CheckOperation, CheckResult, CheckStatus, Evidence, FixError, FixOperation, FixResult,
    FixStatus, OperationInfo, Severity,
};
use crate::source::{ByteRange, ByteSink, ByteSource};
use crate::wave::{self, WaveError, MINIMUM_RIFF_HEADER_LENGTH, RIFF_LENGTH_OFFSET};

/// How far off FL005 lengths are: the size of the canonical WAVE header.
pub const ERROR_AMOUNT: u64 = 44;
/// The data length FL003 files declare.
pub const ERROR_SIZE: u64 = 0;

const LENGTH_FIELD_SIZE: u64 = 4;

const MESSAGE: &str = "RIFF length and data length are incorrect";

/// Fault predicates over `(chunk, file length)`.
struct Fault {
    riff_bad: fn(ByteRange, u64) -> bool,
    data_bad: fn(ByteRange, u64) -> bool,
}

fn expected_riff_length(length: u64) -> u64 {
    length.saturating_sub(MINIMUM_RIFF_HEADER_LENGTH)
}

const OFF_BY_44: Fault = Fault {
    riff_bad: |riff, length| riff.len().checked_sub(expected_riff_length(length)) == Some(ERROR_AMOUNT),
    data_bad: |data, length| data.end.checked_sub(length) == Some(ERROR_AMOUNT),
};

const ZERO_DATA: Fault = Fault {
    riff_bad: |riff, length| riff.len() != expected_riff_length(length),
    data_bad: |data, _| data.len() == ERROR_SIZE,
};

fn inspect(path: &Path, fault: &Fault) -> Result<CheckResult, FixError> {
    let mut file = File::open(path)?;
    if !wave::is_pcm_wave(&mut file).unwrap_or(false) {
        return Ok(CheckResult::silent(CheckStatus::NotApplicable));
    }

    let length = file.length()?;
    let riff = wave::find_riff_chunk(&mut file)?;
    let form = wave::find_wave_chunk(&mut file, riff)?;
    let format = wave::find_format_chunk(&mut file, form, false)?;
    let data = match wave::find_data_chunk(&mut file, form, true) {
        Ok(data) => data,
        Err(WaveError::ChunkNotFound(_)) => return Ok(CheckResult::silent(CheckStatus::Unaffected)),
        Err(e) => return Err(e.into()),
    };

    if (fault.riff_bad)(riff, length) && (fault.data_bad)(data, length) {
        Ok(CheckResult::new(CheckStatus::Affected, Severity::Mild, MESSAGE)
            .with_evidence(Evidence::Chunks { riff, format, data }))
    } else {
        Ok(CheckResult::silent(CheckStatus::Unaffected))
    }
}

fn to_field(value: u64) -> Result<[u8; 4], WaveError> {
    let value = u32::try_from(value).map_err(|_| WaveError::LengthOverflow(value))?;
    let mut field = [0u8; LENGTH_FIELD_SIZE as usize];
    LittleEndian::write_u32(&mut field, value);
    Ok(field)
}

fn repair(path: &Path, check: CheckResult, dry_run: &DryRun) -> Result<FixResult, FixError> {
    let Some(Evidence::Chunks { riff, data, .. }) = check.evidence.clone().filter(|_| check.is_affected()) else {
        return Ok(FixResult::no_operation(check));
    };

    let mut file = open_for_fix(path, dry_run)?;
    let length = file.length()?;
    let new_riff_length = expected_riff_length(length);
    let new_data_length = length.saturating_sub(data.start);
    debug!(new_riff_length, new_data_length, "rewriting chunk lengths");

    let riff_field = to_field(new_riff_length)?;
    let data_field = to_field(new_data_length)?;
    dry_run.would_do(format!("update RIFF length to {new_riff_length}"), || {
        file.write_at(RIFF_LENGTH_OFFSET, &riff_field)
    })?;
    dry_run.would_do(format!("update data length to {new_data_length}"), || {
        file.write_at(data.start - LENGTH_FIELD_SIZE, &data_field)
    })?;

    Ok(FixResult::new(
        FixStatus::Fixed,
        check,
        format!(
            "RIFF length set to {new_riff_length} (was {}). data length set to {new_data_length} (was {})",
            riff.len(),
            data.len(),
        ),
    ))
}

// ── FL005 ─────────────────────────────────────────────────────────────────────

pub struct IncorrectDataSize;

impl IncorrectDataSize {
    pub const INFO: OperationInfo = OperationInfo {
        problem:   problems::INCORRECT_SUB_CHUNK_2,
        fixable:   true,
        safe:      true,
        automatic: true,
        suffix:    None,
    };
}

impl CheckOperation for IncorrectDataSize {
    fn info(&self) -> OperationInfo {
        Self::INFO
    }

    fn check_affected(&self, path: &Path) -> CheckResult {
        inspect(path, &OFF_BY_44).unwrap_or_else(CheckResult::from)
    }

    fn as_fix(&self) -> Option<&dyn FixOperation> {
        Some(self)
    }
}

impl FixOperation for IncorrectDataSize {
    fn process_file(&self, path: &Path, dry_run: &DryRun) -> Result<FixResult, FixError> {
        repair(path, self.check_affected(path), dry_run)
    }
}

// ── FL003 ─────────────────────────────────────────────────────────────────────

/// Unsafe: any chunk after `data` is swallowed into the data length.
pub struct DataSize0;

impl DataSize0 {
    pub const INFO: OperationInfo = OperationInfo {
        problem:   problems::CORRUPT_FULL_SIZE_FILES,
        fixable:   true,
        safe:      false,
        automatic: true,
        suffix:    None,
    };
}

impl CheckOperation for DataSize0 {
    fn info(&self) -> OperationInfo {
        Self::INFO
    }

    fn check_affected(&self, path: &Path) -> CheckResult {
        inspect(path, &ZERO_DATA).unwrap_or_else(CheckResult::from)
    }

    fn as_fix(&self) -> Option<&dyn FixOperation> {
        Some(self)
    }
}

impl FixOperation for DataSize0 {
    fn process_file(&self, path: &Path, dry_run: &DryRun) -> Result<FixResult, FixError> {
        repair(path, self.check_affected(path), dry_run)
    }
}
