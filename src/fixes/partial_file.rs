//! FL011: partial recordings left behind as a file literally named `data`.
//!
//! The recorder streams audio into `data` and renames it once the recording
//! closes.  Power loss leaves the file under its temporary name, in one of
//! three states:
//!
//! | State | Repair |
//! |-------|--------|
//! | empty | rename to `data.error_empty` |
//! | pre-allocated WAVE stub | rename to `data.error_stub` |
//! | FLAC with a torn tail | truncate, fix the sample count, rename |
//!
//! A torn FLAC is scanned from its first frame.  The last decodable frame
//! may itself be incomplete, so the file is cut at the start of that frame
//! and the sample count recomputed from the two frames before it.  The cut-off
//! bytes are kept beside the file as `<new name>.truncated_part`.
//!
//! The repaired file is renamed after its recording start time and tagged, so
//! a second pass finds it no longer named `data` and reports it repaired.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::dry_run::DryRun;
use crate::files::{basename, rename, truncate_split};
use crate::fixes::{
    open_for_fix, problems, CheckOperation, CheckResult, CheckStatus, EmptyFile, Evidence, FixError, FixOperation,
    FixResult, FixStatus, MetadataDurationBug, OperationInfo, PreAllocatedHeader, Severity,
};
use crate::flac::streaminfo::{read_total_samples, write_total_samples, MAX_TOTAL_SAMPLES};
use crate::flac::{self, calculate_sample_count_from_frame_list, find_frames, FlacError};
use crate::frontier_labs::{is_preallocated_file, read_firmware, read_recording_start, write_firmware};
use crate::source::ByteSource;

/// The temporary name the recorder writes to.
pub const PROBLEM_FILE_NAME: &str = "data";
pub const FRAGMENT_EXTENSION: &str = "truncated_part";
pub const UNKNOWN_DATE_NAME: &str = "unknown_date.flac";

struct DurationRepair {
    duration_patch: Option<String>,
    old_samples:    u64,
    new_samples:    u64,
    truncated_at:   u64,
}

pub struct PartialFileRepair;

impl PartialFileRepair {
    pub const INFO: OperationInfo = OperationInfo {
        problem:   problems::PARTIAL_DATA_FILES,
        fixable:   true,
        safe:      false,
        automatic: true,
        suffix:    Some("partial"),
    };

    pub fn patch_tag() -> String {
        Self::INFO.problem.patch_tag()
    }

    fn inspect(path: &Path) -> Result<CheckResult, FixError> {
        let named_data = basename(path) == PROBLEM_FILE_NAME;

        let mut file = File::open(path)?;
        let is_empty = file.length()? == 0;
        let is_flac = !is_empty && flac::is_flac(&mut file).unwrap_or(false);
        let was_repaired = is_flac
            && read_firmware(&mut file).map(|f| f.has_tag(&Self::patch_tag())).unwrap_or(false);
        let is_preallocated_file = !is_empty && !is_flac && is_preallocated_file(&mut file).unwrap_or(false);
        let evidence = Evidence::PartialFile { is_empty, is_flac, is_preallocated_file };

        let result = match () {
            _ if !named_data && was_repaired => {
                CheckResult::new(CheckStatus::Repaired, Severity::None, "File has already been reconstructed")
            }
            _ if !named_data => {
                CheckResult::new(CheckStatus::NotApplicable, Severity::None, "File is not named `data`")
            }
            _ if is_empty => CheckResult::new(CheckStatus::Affected, Severity::Severe, "Partial file detected"),
            _ if is_preallocated_file => CheckResult::new(
                CheckStatus::Affected,
                Severity::Severe,
                format!("Partial file detected: {}", crate::fixes::preallocated::MESSAGE),
            ),
            _ if !is_flac => {
                return Ok(CheckResult::new(
                    CheckStatus::Error,
                    Severity::None,
                    "Unsupported format: partial file is neither FLAC nor a recognised stub",
                ))
            }
            _ => CheckResult::new(CheckStatus::Affected, Severity::Moderate, "Partial file detected"),
        };
        Ok(result.with_evidence(evidence))
    }

    /// `<recording start>_recovered.flac`, or [`UNKNOWN_DATE_NAME`], and the
    /// fragment path beside it.  Neither may exist yet.
    fn recovered_name(path: &Path, file: &mut File) -> Result<(String, PathBuf), FixError> {
        let name = match read_recording_start(file) {
            Ok(start) => format!("{}_recovered.flac", start.to_filename_stamp()),
            Err(e) => {
                debug!(error = %e, "no recording start, using placeholder name");
                UNKNOWN_DATE_NAME.to_owned()
            }
        };

        let dest = path.with_file_name(&name);
        let fragment = path.with_file_name(format!("{name}.{FRAGMENT_EXTENSION}"));
        for taken in [dest, fragment.clone()] {
            if taken.exists() {
                return Err(FixError::NoUniqueName(taken));
            }
        }
        debug!("New filename: {name}");
        Ok((name, fragment))
    }

    fn repair_duration(file: &mut File, fragment: &Path, dry_run: &DryRun) -> Result<DurationRepair, FixError> {
        let old_samples = read_total_samples(file)?;
        let frames = find_frames(file, true)?;
        let [.., third_last, second_last, last] = frames.as_slice() else {
            return Err(FixError::NotEnoughFramesToRepair(frames.len()));
        };

        let duration_patch = MetadataDurationBug::inspect(file)
            .is_affected()
            .then(MetadataDurationBug::patch_tag);

        let new_samples = calculate_sample_count_from_frame_list(&[*third_last, *second_last])?;
        let truncated_at = last.byte_offset;

        if new_samples > MAX_TOTAL_SAMPLES {
            return Err(FlacError::TotalSamplesTooLarge(new_samples).into());
        }

        // nothing in the file changes until the fragment exists
        debug!(
            from = file.length()?,
            to = truncated_at,
            fragment = %fragment.display(),
            "truncating file",
        );
        truncate_split(file, fragment, truncated_at, dry_run)?;

        debug!("Changing duration from {old_samples} to {new_samples}");
        dry_run.would_do(format!("write total samples {new_samples}"), || write_total_samples(file, new_samples))?;

        Ok(DurationRepair { duration_patch, old_samples, new_samples, truncated_at })
    }

    /// Rename to the error name and report why the repair stopped.
    fn give_up(path: &Path, check: CheckResult, message: String, dry_run: &DryRun) -> Result<FixResult, FixError> {
        let dest = rename(path, &Self::INFO.error_name(path), dry_run)?;
        Ok(FixResult::new(FixStatus::NotFixed, check, message).with_new_path(dest))
    }

    fn repair(path: &Path, check: CheckResult, dry_run: &DryRun) -> Result<FixResult, FixError> {
        let evidence = check.evidence.clone().filter(|_| check.is_affected());
        let Some(Evidence::PartialFile { is_empty, is_preallocated_file, .. }) = evidence else {
            return Ok(FixResult::no_operation(check));
        };

        if is_empty {
            debug!("File is empty, renaming, halting");
            let dest = rename(path, &EmptyFile::INFO.error_name(path), dry_run)?;
            return Ok(FixResult::new(FixStatus::Renamed, check, "Partial file was empty").with_new_path(dest));
        }
        if is_preallocated_file {
            debug!("File is a stub, renaming, halting");
            let dest = rename(path, &PreAllocatedHeader::INFO.error_name(path), dry_run)?;
            return Ok(FixResult::new(FixStatus::Renamed, check, "Partial file was a stub and has no useable data")
                .with_new_path(dest));
        }

        let mut file = open_for_fix(path, dry_run)?;
        let firmware = match read_firmware(&mut file) {
            Ok(firmware) => firmware,
            Err(e) => {
                drop(file);
                return Self::give_up(path, check, format!("Error while checking firmware: {e}"), dry_run);
            }
        };

        let (new_name, fragment) = Self::recovered_name(path, &mut file)?;

        let repaired = match Self::repair_duration(&mut file, &fragment, dry_run) {
            Ok(repaired) => repaired,
            Err(e) => {
                drop(file);
                return Self::give_up(path, check, format!("Error while checking duration: {e}"), dry_run);
            }
        };

        let tag = Self::patch_tag();
        let mut tagged = firmware.with_tag(&tag);
        if let Some(patch) = &repaired.duration_patch {
            tagged = tagged.with_tag(patch);
        }
        dry_run.would_do(format!("update firmware tag with {tag}"), || write_firmware(&mut file, &tagged))?;
        drop(file);

        let dest = rename(path, &new_name, dry_run)?;
        let message = format!(
            "Partial file repaired. New name is {new_name}. Samples count was {}, new samples count is: {}. \
             File truncated at {}.",
            repaired.old_samples, repaired.new_samples, repaired.truncated_at,
        );
        Ok(FixResult::new(FixStatus::Fixed, check, message).with_new_path(dest))
    }
}

impl CheckOperation for PartialFileRepair {
    fn info(&self) -> OperationInfo {
        Self::INFO
    }

    fn check_affected(&self, path: &Path) -> CheckResult {
        Self::inspect(path).unwrap_or_else(CheckResult::from)
    }

    fn as_fix(&self) -> Option<&dyn FixOperation> {
        Some(self)
    }
}

impl FixOperation for PartialFileRepair {
    fn process_file(&self, path: &Path, dry_run: &DryRun) -> Result<FixResult, FixError> {
        Self::repair(path, self.check_affected(path), dry_run)
    }
}
