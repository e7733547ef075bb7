//! Simulated mutation.
//!
//! Every write a fix performs goes through [`DryRun::would_do`].  In a dry run
//! the closure is skipped and the intent is logged instead, so a dry run
//! computes and reports exactly what a real run would while leaving the file
//! untouched.

use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DryRun {
    enabled: bool,
}

impl DryRun {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_dry_run(&self) -> bool {
        self.enabled
    }

    /// Run `action` unless this is a dry run.  Returns `None` when skipped.
    pub fn would_do<T, E>(
        &self,
        message: impl AsRef<str>,
        action:  impl FnOnce() -> Result<T, E>,
    ) -> Result<Option<T>, E> {
        let message = message.as_ref();
        if self.enabled {
            info!("would {message}");
            return Ok(None);
        }
        debug!("{message}");
        action().map(Some)
    }
}
