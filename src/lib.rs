pub mod bits;
pub mod source;
pub mod flac;
pub mod wave;
pub mod frontier_labs;
pub mod dry_run;
pub mod files;
pub mod fixes;

pub use source::{ByteRange, ByteSink, ByteSource};
pub use flac::{FlacError, Frame, FrameHeader, FrameScanner, ScanOptions, StreamInfo};
pub use wave::WaveError;
pub use frontier_labs::{FirmwareError, FirmwareRecord};
pub use dry_run::DryRun;
pub use fixes::{
    apply, check, ApplyOptions, CheckOperation, CheckResult, CheckStatus, FixApplyResult, FixCheckResult,
    FixError, FixOperation, FixResult, FixStatus, Severity,
};
