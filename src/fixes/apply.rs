//! Running a selection of operations over files.
//!
//! [`check`] is read-only and reports one [`CheckResult`] per operation per
//! file.  [`apply`] checks a single file and then decides what, if anything,
//! to change:
//!
//! 1. a check that errored means nothing is touched;
//! 2. a file nothing affects is left alone;
//! 3. a check-only problem worse than [`Severity::Mild`] gets the file renamed
//!    to its error name, and no fix runs;
//! 4. otherwise the file is optionally backed up and each fix runs in order,
//!    following the file through any rename a fix performs.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dry_run::DryRun;
use crate::files::{backup, basename, rename};
use crate::fixes::{CheckOperation, CheckResult, CheckStatus, FixError, FixResult, FixStatus, OperationInfo, Severity};

/// Names produced by an earlier error rename.
const ERROR_SUFFIX_PATTERN: &str = r"\.error_\w+$";

static ERROR_SUFFIX: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

fn error_suffix() -> Result<&'static Regex, FixError> {
    ERROR_SUFFIX
        .get_or_init(|| Regex::new(ERROR_SUFFIX_PATTERN))
        .as_ref()
        .map_err(|e| FixError::Pattern(e.clone()))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    pub dry_run:   bool,
    /// Copy each file to `<path>.bak` before the first fix touches it.
    pub backup:    bool,
    /// Leave files with unfixable problems under their current name.
    pub no_rename: bool,
}

// ── Reports ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProblemOutcome {
    pub id:     &'static str,
    pub result: FixResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixApplyResult {
    pub file:     PathBuf,
    pub backup:   Option<PathBuf>,
    pub problems: Vec<ProblemOutcome>,
}

fn status_code(status: FixStatus) -> &'static str {
    match status {
        FixStatus::Fixed       => "FIXED",
        FixStatus::NotFixed    => "ERR",
        FixStatus::Renamed     => "RENAMED",
        FixStatus::NoOperation => "NOOP",
    }
}

impl FixApplyResult {
    /// Where the file ended up after every rename.
    pub fn final_path(&self) -> &Path {
        self.problems
            .iter()
            .rev()
            .find_map(|p| p.result.new_path.as_deref())
            .unwrap_or(&self.file)
    }

    pub fn changed(&self) -> bool {
        self.problems.iter().any(|p| p.result.status != FixStatus::NoOperation)
    }

    /// `<file>\tFL010=FIXED FL011=NOOP ...`
    pub fn compact(&self) -> String {
        let statuses: Vec<String> = self
            .problems
            .iter()
            .map(|p| format!("{}={}", p.id, status_code(p.result.status)))
            .collect();
        format!("{}\t{}", self.file.display(), statuses.join(" "))
    }

    pub fn table(&self) -> String {
        let mut out = format!("File {}:\n", self.file.display());
        if let Some(backup) = &self.backup {
            out.push_str(&format!("\tBacked up to {}\n", backup.display()));
        }
        for p in &self.problems {
            let check = &p.result.check;
            out.push_str(&format!(
                "\t- {} is {:?} {}.\n\t  Action taken: {:?}. {}\n",
                p.id,
                check.status,
                check.message.as_deref().unwrap_or(""),
                p.result.status,
                p.result.message.as_deref().unwrap_or(""),
            ));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckOutcome {
    pub id:     &'static str,
    pub result: CheckResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixCheckResult {
    pub file:   PathBuf,
    pub checks: Vec<CheckOutcome>,
}

impl FixCheckResult {
    pub fn any_affected(&self) -> bool {
        self.checks.iter().any(|c| c.result.is_affected())
    }

    /// `<file>\tFL010=Affected FL011=NotApplicable ...`
    pub fn compact(&self) -> String {
        let statuses: Vec<String> = self.checks.iter().map(|c| format!("{}={:?}", c.id, c.result.status)).collect();
        format!("{}\t{}", self.file.display(), statuses.join(" "))
    }

    pub fn table(&self) -> String {
        let mut out = format!("File {}:\n", self.file.display());
        for c in &self.checks {
            out.push_str(&format!(
                "\t- {} is {:?} ({:?}) {}\n",
                c.id,
                c.result.status,
                c.result.severity,
                c.result.message.as_deref().unwrap_or(""),
            ));
        }
        out
    }
}

// ── Check ─────────────────────────────────────────────────────────────────────

fn check_one(path: &Path, operations: &[&dyn CheckOperation]) -> FixCheckResult {
    let checks = operations
        .iter()
        .map(|op| CheckOutcome { id: op.info().problem.id, result: op.check_affected(path) })
        .collect();
    FixCheckResult { file: path.to_owned(), checks }
}

/// Run every operation's check over every path.  Results come back in the
/// order of `paths`.
pub fn check(paths: &[PathBuf], operations: &[&dyn CheckOperation]) -> Vec<FixCheckResult> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        paths.par_iter().map(|path| check_one(path, operations)).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        paths.iter().map(|path| check_one(path, operations)).collect()
    }
}

// ── Apply ─────────────────────────────────────────────────────────────────────

fn no_operations(operations: &[&dyn CheckOperation], checks: Vec<CheckResult>) -> Vec<ProblemOutcome> {
    operations
        .iter()
        .zip(checks)
        .map(|(op, check)| ProblemOutcome { id: op.info().problem.id, result: FixResult::no_operation(check) })
        .collect()
}

fn rename_unfixable(
    path:    &Path,
    info:    OperationInfo,
    check:   CheckResult,
    options: &ApplyOptions,
    dry_run: &DryRun,
) -> Result<FixResult, FixError> {
    if error_suffix()?.is_match(&basename(path)) {
        return Ok(FixResult::new(FixStatus::NotFixed, check, "Already has been renamed as an error file"));
    }
    if options.no_rename {
        return Ok(FixResult { status: FixStatus::NotFixed, check, message: None, new_path: None });
    }

    let dest = rename(path, &info.error_name(path), dry_run)?;
    Ok(FixResult::new(FixStatus::Renamed, check, format!("Renamed to: {}", dest.display())).with_new_path(dest))
}

/// Check `path` against `operations` and repair what can be repaired.
pub fn apply(
    path:       &Path,
    operations: &[&dyn CheckOperation],
    options:    &ApplyOptions,
) -> Result<FixApplyResult, FixError> {
    let dry_run = DryRun::new(options.dry_run);
    let checks: Vec<CheckResult> = operations.iter().map(|op| op.check_affected(path)).collect();
    let mut result = FixApplyResult { file: path.to_owned(), backup: None, problems: Vec::new() };

    if let Some((op, failed)) = operations.iter().zip(&checks).find(|(_, c)| c.status == CheckStatus::Error) {
        warn!(
            path = %path.display(),
            problem = op.info().problem.id,
            reason = failed.message.as_deref().unwrap_or(""),
            "check failed, file left untouched",
        );
        result.problems = no_operations(operations, checks);
        return Ok(result);
    }

    if !checks.iter().any(CheckResult::is_affected) {
        debug!(path = %path.display(), "no problems found");
        result.problems = no_operations(operations, checks);
        return Ok(result);
    }

    let unfixable = operations
        .iter()
        .zip(&checks)
        .position(|(op, check)| op.as_fix().is_none() && check.severity > Severity::Mild);

    if let Some(index) = unfixable {
        for (i, (op, check)) in operations.iter().zip(checks).enumerate() {
            let outcome = if i == index {
                rename_unfixable(path, op.info(), check, options, &dry_run)?
            } else {
                FixResult::no_operation(check)
            };
            result.problems.push(ProblemOutcome { id: op.info().problem.id, result: outcome });
        }
        return Ok(result);
    }

    if options.backup {
        result.backup = Some(backup(path, &dry_run)?);
    }

    let mut current = path.to_owned();
    for (op, check) in operations.iter().zip(checks) {
        let id = op.info().problem.id;
        let outcome = match op.as_fix() {
            Some(fix) if check.is_affected() => match fix.process_file(&current, &dry_run) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(path = %current.display(), problem = id, error = %e, "fix failed");
                    FixResult::new(FixStatus::NotFixed, check, e.to_string())
                }
            },
            _ => FixResult::no_operation(check),
        };

        if outcome.status != FixStatus::NoOperation {
            info!(path = %current.display(), problem = id, status = ?outcome.status, "applied");
        }
        // a dry run never moves the file, so later fixes still find it here
        if let (Some(new_path), false) = (&outcome.new_path, dry_run.is_dry_run()) {
            current = new_path.clone();
        }
        result.problems.push(ProblemOutcome { id, result: outcome });
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixes::{all_operations, EmptyFile, SpaceInDatestamp};
    use std::fs;

    #[test]
    fn error_suffix_matches_renamed_files() {
        let re = error_suffix().unwrap();
        assert!(re.is_match("data.error_empty"));
        assert!(re.is_match("x.flac.error_FL010"));
        assert!(!re.is_match("data.error_"));
        assert!(!re.is_match("data"));
    }

    #[test]
    fn unaffected_file_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("20200406T020000Z_site.wav");
        fs::write(&path, b"not really audio").unwrap();

        let ops: Vec<&dyn CheckOperation> = vec![&SpaceInDatestamp];
        let result = apply(&path, &ops, &ApplyOptions::default()).unwrap();
        assert!(!result.changed());
        assert_eq!(result.compact(), format!("{}\tFL008=NOOP", path.display()));
    }

    #[test]
    fn empty_file_is_renamed_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording.flac");
        fs::write(&path, b"").unwrap();

        let ops: Vec<&dyn CheckOperation> = vec![&EmptyFile];
        let first = apply(&path, &ops, &ApplyOptions::default()).unwrap();
        assert_eq!(first.problems[0].result.status, FixStatus::Renamed);
        let renamed = dir.path().join("recording.flac.error_empty");
        assert_eq!(first.final_path(), renamed);
        assert!(renamed.exists());

        let second = apply(&renamed, &ops, &ApplyOptions::default()).unwrap();
        assert_eq!(second.problems[0].result.status, FixStatus::NotFixed);
        assert_eq!(
            second.problems[0].result.message.as_deref(),
            Some("Already has been renamed as an error file"),
        );
    }

    #[test]
    fn tables_list_each_problem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording.flac");
        fs::write(&path, b"").unwrap();
        let ops: Vec<&dyn CheckOperation> = vec![&EmptyFile];

        let checked = check(&[path.clone()], &ops);
        assert_eq!(
            checked[0].table(),
            format!("File {}:\n\t- OE004 is Affected (Severe) File is empty\n", path.display()),
        );

        let result = apply(&path, &ops, &ApplyOptions { backup: true, ..Default::default() }).unwrap();
        let dest = dir.path().join("recording.flac.error_empty");
        assert_eq!(result.backup, None);
        assert_eq!(
            result.table(),
            format!(
                "File {}:\n\t- OE004 is Affected File is empty.\n\t  Action taken: Renamed. Renamed to: {}\n",
                path.display(),
                dest.display(),
            ),
        );
    }

    #[test]
    fn no_rename_reports_not_fixed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording.flac");
        fs::write(&path, b"").unwrap();

        let ops: Vec<&dyn CheckOperation> = vec![&EmptyFile];
        let options = ApplyOptions { no_rename: true, ..Default::default() };
        let result = apply(&path, &ops, &options).unwrap();
        assert_eq!(result.problems[0].result.status, FixStatus::NotFixed);
        assert!(path.exists());
    }

    #[test]
    fn check_reports_every_operation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("202004 6T020000Z_site.flac");
        fs::write(&path, b"").unwrap();

        let results = check(&[path], all_operations());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].checks.len(), all_operations().len());
        assert!(results[0].any_affected());
    }
}
