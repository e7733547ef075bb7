//! A space where a zero belongs in a file name's datestamp, e.g.
//! `202004 6T020000Z` for `20200406T020000Z`.  Filename only; the file's
//! contents are never read.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::dry_run::DryRun;
use crate::files::{basename, rename};
use crate::fixes::{
    problems, CheckOperation, CheckResult, CheckStatus, Evidence, FixError, FixOperation, FixResult, FixStatus,
    OperationInfo, Severity,
};

const PATTERN: &str = r"(.*\d{6})( )(\dT\d{6}.*)";
const REPLACEMENT: &str = "${1}0${3}";

static MATCHER: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

fn matcher() -> Result<&'static Regex, FixError> {
    MATCHER
        .get_or_init(|| Regex::new(PATTERN))
        .as_ref()
        .map_err(|e| FixError::Pattern(e.clone()))
}

pub struct SpaceInDatestamp;

impl SpaceInDatestamp {
    pub const INFO: OperationInfo = OperationInfo {
        problem:   problems::INVALID_DATE_STAMP_SPACE_ZERO,
        fixable:   true,
        safe:      true,
        automatic: true,
        suffix:    None,
    };

    fn check(path: &Path) -> Result<CheckResult, FixError> {
        let name = basename(path);
        let matcher = matcher()?;
        if !matcher.is_match(&name) {
            return Ok(CheckResult::silent(CheckStatus::Unaffected));
        }
        let fixed = matcher.replace(&name, REPLACEMENT).into_owned();
        Ok(CheckResult::new(CheckStatus::Affected, Severity::Mild, "Space in datestamp detected")
            .with_evidence(Evidence::NewName { name: fixed }))
    }
}

impl CheckOperation for SpaceInDatestamp {
    fn info(&self) -> OperationInfo {
        Self::INFO
    }

    fn check_affected(&self, path: &Path) -> CheckResult {
        Self::check(path).unwrap_or_else(CheckResult::from)
    }

    fn as_fix(&self) -> Option<&dyn FixOperation> {
        Some(self)
    }
}

impl FixOperation for SpaceInDatestamp {
    fn process_file(&self, path: &Path, dry_run: &DryRun) -> Result<FixResult, FixError> {
        let check = self.check_affected(path);
        let Some(Evidence::NewName { name }) = check.evidence.clone().filter(|_| check.is_affected()) else {
            return Ok(FixResult::no_operation(check));
        };

        let dest = rename(path, &name, dry_run)?;
        Ok(FixResult::new(FixStatus::Fixed, check, "Inserted `0` into datestamp").with_new_path(dest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_and_proposes_the_zero() {
        let check = SpaceInDatestamp.check_affected(Path::new("/x/202004 6T020000Z_site.flac"));
        assert_eq!(check.status, CheckStatus::Affected);
        assert_eq!(check.evidence, Some(Evidence::NewName { name: "20200406T020000Z_site.flac".into() }));
    }

    #[test]
    fn clean_names_are_unaffected() {
        let check = SpaceInDatestamp.check_affected(Path::new("/x/20200426T020000Z_site.flac"));
        assert_eq!(check.status, CheckStatus::Unaffected);
    }
}
