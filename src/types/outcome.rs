//! Outcome classification for one analyzer invocation.

use serde::Serialize;
use std::fmt;

/// Exit code written into the result when the timeout watcher killed the analyzer.
///
/// Lies below every negated signal number and differs from
/// [`NO_EXIT_CODE`](super::NO_EXIT_CODE), so archives tell a timeout from a
/// spawn failure or a signal death by the code alone.
pub const TIMEOUT_RETURN_CODE: i32 = -256;

/// Why an analyzer invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    CompileError,
    Crash,
    Timeout,
    Unknown,
}

impl FailureKind {
    /// Maps a raw exit code; `None` means success.
    #[must_use]
    pub fn from_exit_code(code: i32) -> Option<Self> {
        match code {
            0 => None,
            1 => Some(Self::CompileError),
            254 => Some(Self::Crash),
            _ => Some(Self::Unknown),
        }
    }

    /// Suffix appended to the failure archive name.
    #[must_use]
    pub fn archive_suffix(self) -> &'static str {
        match self {
            Self::CompileError => "_compile_error",
            Self::Crash => "_crash",
            Self::Timeout => "_timeout",
            Self::Unknown => "_unknown",
        }
    }

    pub const ALL: [FailureKind; 4] = [
        Self::CompileError,
        Self::Crash,
        Self::Timeout,
        Self::Unknown,
    ];
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::CompileError => "compile error",
            Self::Crash => "crash",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown failure",
        };
        f.write_str(label)
    }
}

/// Terminal status of one translation unit in the analysis pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnalysisStatus {
    Success,
    Failed(FailureKind),
    /// The run was interrupted before or while this unit ran.
    Cancelled,
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Failed(kind) => write!(f, "failed ({kind})"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}
